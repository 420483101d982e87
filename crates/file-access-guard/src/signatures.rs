//! Binary signature database.
//!
//! An ordered, immutable table of format descriptors. Matching walks the table in
//! declaration order and the first descriptor that matches wins, so the order is part
//! of the contract: more specific formats (ZIP containers, ISO-BMFF brands, RIFF forms)
//! are declared before the generic format they are built on.
//!
//! Some magic numbers are genuinely shared between unrelated formats. `CAFEBABE` starts
//! both Java class files and Mach-O universal binaries; `JAVA_CLASS` is declared first
//! and therefore wins. [`SignatureDatabase::shadowed_type_ids`] lists these pairs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Default number of leading bytes considered when matching.
pub const DEFAULT_MAX_READ_BYTES: usize = 64 * 1024;

/// Broad family a format belongs to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Category {
    Document,
    Image,
    Executable,
    Archive,
    Audio,
    Video,
    Code,
    Other,
}

/// A byte sequence expected at a fixed offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Magic {
    pub offset: usize,
    pub bytes: &'static [u8],
}

impl Magic {
    #[must_use]
    pub const fn at(offset: usize, bytes: &'static [u8]) -> Self {
        Self { offset, bytes }
    }

    #[must_use]
    pub fn matches(&self, buf: &[u8]) -> bool {
        buf.get(self.offset..self.offset + self.bytes.len()) == Some(self.bytes)
    }
}

/// Structural check run on the same buffer after a byte-level match.
pub type StructuralValidator = fn(&[u8]) -> bool;

/// One known format.
#[derive(Debug, Serialize)]
pub struct SignatureDescriptor {
    pub type_id: &'static str,
    pub category: Category,
    /// Alternatives: any one matching is a byte-level match.
    pub magic: &'static [Magic],
    pub extensions: &'static [&'static str],
    pub mime_type: &'static str,
    #[serde(rename = "has_validator", serialize_with = "serialize_has_validator")]
    pub validator: Option<StructuralValidator>,
}

fn serialize_has_validator<S: serde::Serializer>(
    validator: &Option<StructuralValidator>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_bool(validator.is_some())
}

impl SignatureDescriptor {
    const fn new(
        type_id: &'static str,
        category: Category,
        magic: &'static [Magic],
        extensions: &'static [&'static str],
        mime_type: &'static str,
    ) -> Self {
        Self {
            type_id,
            category,
            magic,
            extensions,
            mime_type,
            validator: None,
        }
    }

    const fn validated(mut self, validator: StructuralValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Byte-level match against any magic alternative.
    #[must_use]
    pub fn matches_magic(&self, buf: &[u8]) -> bool {
        self.magic.iter().any(|m| m.matches(buf))
    }

    #[must_use]
    pub fn has_extension(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}

impl PartialEq for SignatureDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for SignatureDescriptor {}

/// Options for [`SignatureDatabase::match_signature`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOptions {
    pub max_read_bytes: usize,
    pub run_validators: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            max_read_bytes: DEFAULT_MAX_READ_BYTES,
            run_validators: true,
        }
    }
}

// Structural validators

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

fn is_ooxml(buf: &[u8], part_prefix: &[u8]) -> bool {
    contains(buf, b"[Content_Types].xml") && contains(buf, part_prefix)
}

fn is_docx(buf: &[u8]) -> bool {
    is_ooxml(buf, b"word/")
}

fn is_xlsx(buf: &[u8]) -> bool {
    is_ooxml(buf, b"xl/")
}

fn is_pptx(buf: &[u8]) -> bool {
    is_ooxml(buf, b"ppt/")
}

// ODF and EPUB store an uncompressed `mimetype` entry first.
fn is_odt(buf: &[u8]) -> bool {
    contains(buf, b"mimetypeapplication/vnd.oasis.opendocument.text")
}

fn is_ods(buf: &[u8]) -> bool {
    contains(buf, b"mimetypeapplication/vnd.oasis.opendocument.spreadsheet")
}

fn is_odp(buf: &[u8]) -> bool {
    contains(buf, b"mimetypeapplication/vnd.oasis.opendocument.presentation")
}

fn is_epub(buf: &[u8]) -> bool {
    contains(buf, b"mimetypeapplication/epub+zip")
}

fn is_apk(buf: &[u8]) -> bool {
    contains(buf, b"AndroidManifest.xml")
}

fn is_jar(buf: &[u8]) -> bool {
    contains(buf, b"META-INF/")
}

fn riff_header(buf: &[u8]) -> bool {
    buf.starts_with(b"RIFF")
}

fn iff_header(buf: &[u8]) -> bool {
    buf.starts_with(b"FORM")
}

fn bmff_brand_in(buf: &[u8], brands: &[&[u8; 4]]) -> bool {
    buf.get(8..12)
        .is_some_and(|brand| brands.iter().any(|b| brand == *b))
}

fn is_avif(buf: &[u8]) -> bool {
    bmff_brand_in(buf, &[b"avif", b"avis"])
}

fn is_heic(buf: &[u8]) -> bool {
    bmff_brand_in(
        buf,
        &[b"heic", b"heix", b"hevc", b"hevx", b"heim", b"heis", b"mif1", b"msf1"],
    )
}

fn is_m4a(buf: &[u8]) -> bool {
    bmff_brand_in(buf, &[b"M4A ", b"M4B ", b"M4P "])
}

fn is_quicktime(buf: &[u8]) -> bool {
    bmff_brand_in(buf, &[b"qt  "])
}

fn is_webm(buf: &[u8]) -> bool {
    contains(&buf[..buf.len().min(64)], b"webm")
}

const ZIP_LOCAL: &[Magic] = &[Magic::at(0, b"PK\x03\x04")];
const BMFF: &[Magic] = &[Magic::at(4, b"ftyp")];
const EBML: &[Magic] = &[Magic::at(0, &[0x1A, 0x45, 0xDF, 0xA3])];
const CAFEBABE: Magic = Magic::at(0, &[0xCA, 0xFE, 0xBA, 0xBE]);

use Category::{Archive, Audio, Code, Document, Executable, Image, Other, Video};

static SIGNATURES: &[SignatureDescriptor] = &[
    // ZIP containers, before plain ZIP
    SignatureDescriptor::new(
        "DOCX",
        Document,
        ZIP_LOCAL,
        &["docx", "docm", "dotx"],
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    )
    .validated(is_docx),
    SignatureDescriptor::new(
        "XLSX",
        Document,
        ZIP_LOCAL,
        &["xlsx", "xlsm", "xltx"],
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    )
    .validated(is_xlsx),
    SignatureDescriptor::new(
        "PPTX",
        Document,
        ZIP_LOCAL,
        &["pptx", "pptm", "potx"],
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    )
    .validated(is_pptx),
    SignatureDescriptor::new(
        "ODT",
        Document,
        ZIP_LOCAL,
        &["odt"],
        "application/vnd.oasis.opendocument.text",
    )
    .validated(is_odt),
    SignatureDescriptor::new(
        "ODS",
        Document,
        ZIP_LOCAL,
        &["ods"],
        "application/vnd.oasis.opendocument.spreadsheet",
    )
    .validated(is_ods),
    SignatureDescriptor::new(
        "ODP",
        Document,
        ZIP_LOCAL,
        &["odp"],
        "application/vnd.oasis.opendocument.presentation",
    )
    .validated(is_odp),
    SignatureDescriptor::new(
        "EPUB",
        Document,
        ZIP_LOCAL,
        &["epub"],
        "application/epub+zip",
    )
    .validated(is_epub),
    SignatureDescriptor::new(
        "APK",
        Executable,
        ZIP_LOCAL,
        &["apk"],
        "application/vnd.android.package-archive",
    )
    .validated(is_apk),
    SignatureDescriptor::new(
        "JAR",
        Executable,
        ZIP_LOCAL,
        &["jar", "war", "ear"],
        "application/java-archive",
    )
    .validated(is_jar),
    SignatureDescriptor::new(
        "ZIP",
        Archive,
        &[
            Magic::at(0, b"PK\x03\x04"),
            Magic::at(0, b"PK\x05\x06"),
            Magic::at(0, b"PK\x07\x08"),
        ],
        &["zip"],
        "application/zip",
    ),
    // ISO base media brands, before generic MP4
    SignatureDescriptor::new("AVIF", Image, BMFF, &["avif"], "image/avif").validated(is_avif),
    SignatureDescriptor::new("HEIC", Image, BMFF, &["heic", "heif"], "image/heic")
        .validated(is_heic),
    SignatureDescriptor::new("M4A", Audio, BMFF, &["m4a", "m4b", "m4p"], "audio/mp4")
        .validated(is_m4a),
    SignatureDescriptor::new("MOV", Video, BMFF, &["mov", "qt"], "video/quicktime")
        .validated(is_quicktime),
    SignatureDescriptor::new("MP4", Video, BMFF, &["mp4", "m4v", "3gp"], "video/mp4"),
    // RIFF / IFF forms
    SignatureDescriptor::new("WAV", Audio, &[Magic::at(8, b"WAVE")], &["wav"], "audio/wav")
        .validated(riff_header),
    SignatureDescriptor::new("AVI", Video, &[Magic::at(8, b"AVI ")], &["avi"], "video/x-msvideo")
        .validated(riff_header),
    SignatureDescriptor::new("WEBP", Image, &[Magic::at(8, b"WEBP")], &["webp"], "image/webp")
        .validated(riff_header),
    SignatureDescriptor::new(
        "AIFF",
        Audio,
        &[Magic::at(8, b"AIFF"), Magic::at(8, b"AIFC")],
        &["aiff", "aif", "aifc"],
        "audio/aiff",
    )
    .validated(iff_header),
    // EBML, WebM before Matroska
    SignatureDescriptor::new("WEBM", Video, EBML, &["webm"], "video/webm").validated(is_webm),
    SignatureDescriptor::new("MKV", Video, EBML, &["mkv", "mka", "mk3d"], "video/x-matroska"),
    // Documents
    SignatureDescriptor::new("PDF", Document, &[Magic::at(0, b"%PDF-")], &["pdf"], "application/pdf"),
    SignatureDescriptor::new(
        "OLE_COMPOUND",
        Document,
        &[Magic::at(0, &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1])],
        &["doc", "dot", "xls", "xlt", "ppt", "pot", "msi", "msg", "vsd"],
        "application/x-ole-storage",
    ),
    SignatureDescriptor::new("RTF", Document, &[Magic::at(0, b"{\\rtf")], &["rtf"], "application/rtf"),
    SignatureDescriptor::new(
        "POSTSCRIPT",
        Document,
        &[Magic::at(0, b"%!PS")],
        &["ps", "eps"],
        "application/postscript",
    ),
    // Images
    SignatureDescriptor::new(
        "PNG",
        Image,
        &[Magic::at(0, &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])],
        &["png"],
        "image/png",
    ),
    SignatureDescriptor::new(
        "JPEG",
        Image,
        &[Magic::at(0, &[0xFF, 0xD8, 0xFF])],
        &["jpg", "jpeg", "jpe", "jfif"],
        "image/jpeg",
    ),
    SignatureDescriptor::new("GIF87", Image, &[Magic::at(0, b"GIF87a")], &["gif"], "image/gif"),
    SignatureDescriptor::new("GIF89", Image, &[Magic::at(0, b"GIF89a")], &["gif"], "image/gif"),
    SignatureDescriptor::new(
        "TIFF",
        Image,
        &[Magic::at(0, b"II*\x00"), Magic::at(0, b"MM\x00*")],
        &["tif", "tiff"],
        "image/tiff",
    ),
    SignatureDescriptor::new("PSD", Image, &[Magic::at(0, b"8BPS")], &["psd"], "image/vnd.adobe.photoshop"),
    SignatureDescriptor::new("ICO", Image, &[Magic::at(0, &[0, 0, 1, 0])], &["ico"], "image/x-icon"),
    SignatureDescriptor::new("CUR", Image, &[Magic::at(0, &[0, 0, 2, 0])], &["cur"], "image/x-icon"),
    SignatureDescriptor::new("BMP", Image, &[Magic::at(0, b"BM")], &["bmp", "dib"], "image/bmp"),
    // Executables
    SignatureDescriptor::new(
        "EXE",
        Executable,
        &[Magic::at(0, b"MZ")],
        &["exe", "dll", "sys", "scr", "com", "cpl", "ocx", "efi"],
        "application/vnd.microsoft.portable-executable",
    ),
    SignatureDescriptor::new(
        "ELF",
        Executable,
        &[Magic::at(0, b"\x7FELF")],
        &["elf", "so", "o", "ko", "axf"],
        "application/x-executable",
    ),
    SignatureDescriptor::new(
        "MACHO",
        Executable,
        &[
            Magic::at(0, &[0xFE, 0xED, 0xFA, 0xCE]),
            Magic::at(0, &[0xFE, 0xED, 0xFA, 0xCF]),
            Magic::at(0, &[0xCE, 0xFA, 0xED, 0xFE]),
            Magic::at(0, &[0xCF, 0xFA, 0xED, 0xFE]),
        ],
        &["dylib", "bundle"],
        "application/x-mach-binary",
    ),
    SignatureDescriptor::new("JAVA_CLASS", Code, &[CAFEBABE], &["class"], "application/java-vm"),
    SignatureDescriptor::new(
        "MACHO_FAT",
        Executable,
        &[CAFEBABE, Magic::at(0, &[0xCA, 0xFE, 0xBA, 0xBF])],
        &["dylib", "bundle"],
        "application/x-mach-binary",
    ),
    SignatureDescriptor::new("WASM", Executable, &[Magic::at(0, b"\x00asm")], &["wasm"], "application/wasm"),
    SignatureDescriptor::new("DEX", Executable, &[Magic::at(0, b"dex\n")], &["dex"], "application/vnd.android.dex"),
    SignatureDescriptor::new(
        "LNK",
        Executable,
        &[Magic::at(0, &[0x4C, 0x00, 0x00, 0x00, 0x01, 0x14, 0x02, 0x00])],
        &["lnk"],
        "application/x-ms-shortcut",
    ),
    // Archives
    SignatureDescriptor::new("GZIP", Archive, &[Magic::at(0, &[0x1F, 0x8B])], &["gz", "tgz"], "application/gzip"),
    SignatureDescriptor::new("BZIP2", Archive, &[Magic::at(0, b"BZh")], &["bz2", "tbz2"], "application/x-bzip2"),
    SignatureDescriptor::new(
        "XZ",
        Archive,
        &[Magic::at(0, &[0xFD, b'7', b'z', b'X', b'Z', 0x00])],
        &["xz", "txz"],
        "application/x-xz",
    ),
    SignatureDescriptor::new(
        "7Z",
        Archive,
        &[Magic::at(0, &[b'7', b'z', 0xBC, 0xAF, 0x27, 0x1C])],
        &["7z"],
        "application/x-7z-compressed",
    ),
    SignatureDescriptor::new(
        "RAR",
        Archive,
        &[Magic::at(0, b"Rar!\x1A\x07")],
        &["rar"],
        "application/vnd.rar",
    ),
    SignatureDescriptor::new(
        "ZSTD",
        Archive,
        &[Magic::at(0, &[0x28, 0xB5, 0x2F, 0xFD])],
        &["zst"],
        "application/zstd",
    ),
    SignatureDescriptor::new(
        "LZ4",
        Archive,
        &[Magic::at(0, &[0x04, 0x22, 0x4D, 0x18])],
        &["lz4"],
        "application/x-lz4",
    ),
    SignatureDescriptor::new("CAB", Archive, &[Magic::at(0, b"MSCF")], &["cab"], "application/vnd.ms-cab-compressed"),
    SignatureDescriptor::new("TAR", Archive, &[Magic::at(257, b"ustar")], &["tar"], "application/x-tar"),
    SignatureDescriptor::new("ISO", Archive, &[Magic::at(0x8001, b"CD001")], &["iso"], "application/x-iso9660-image"),
    // Audio
    SignatureDescriptor::new(
        "MP3",
        Audio,
        &[
            Magic::at(0, b"ID3"),
            Magic::at(0, &[0xFF, 0xFB]),
            Magic::at(0, &[0xFF, 0xF3]),
            Magic::at(0, &[0xFF, 0xF2]),
        ],
        &["mp3"],
        "audio/mpeg",
    ),
    SignatureDescriptor::new("FLAC", Audio, &[Magic::at(0, b"fLaC")], &["flac"], "audio/flac"),
    SignatureDescriptor::new("OGG", Audio, &[Magic::at(0, b"OggS")], &["ogg", "oga", "ogv", "opus"], "audio/ogg"),
    SignatureDescriptor::new("MIDI", Audio, &[Magic::at(0, b"MThd")], &["mid", "midi"], "audio/midi"),
    SignatureDescriptor::new("AMR", Audio, &[Magic::at(0, b"#!AMR")], &["amr"], "audio/amr"),
    // Video
    SignatureDescriptor::new("FLV", Video, &[Magic::at(0, b"FLV\x01")], &["flv"], "video/x-flv"),
    SignatureDescriptor::new(
        "ASF",
        Video,
        &[Magic::at(0, &[0x30, 0x26, 0xB2, 0x75, 0x8E, 0x66, 0xCF, 0x11])],
        &["wmv", "wma", "asf"],
        "video/x-ms-asf",
    ),
    SignatureDescriptor::new(
        "MPEG_PS",
        Video,
        &[Magic::at(0, &[0x00, 0x00, 0x01, 0xBA])],
        &["mpg", "mpeg", "vob"],
        "video/mpeg",
    ),
    // Fonts, databases, key material
    SignatureDescriptor::new("WOFF", Other, &[Magic::at(0, b"wOFF")], &["woff"], "font/woff"),
    SignatureDescriptor::new("WOFF2", Other, &[Magic::at(0, b"wOF2")], &["woff2"], "font/woff2"),
    SignatureDescriptor::new("OTF", Other, &[Magic::at(0, b"OTTO")], &["otf"], "font/otf"),
    SignatureDescriptor::new(
        "TTF",
        Other,
        &[Magic::at(0, &[0x00, 0x01, 0x00, 0x00, 0x00])],
        &["ttf"],
        "font/ttf",
    ),
    SignatureDescriptor::new(
        "SQLITE",
        Other,
        &[Magic::at(0, b"SQLite format 3\x00")],
        &["sqlite", "sqlite3", "db"],
        "application/vnd.sqlite3",
    ),
    SignatureDescriptor::new(
        "PEM",
        Other,
        &[Magic::at(0, b"-----BEGIN ")],
        &["pem", "crt", "cer", "key", "csr"],
        "application/x-pem-file",
    ),
    // Text formats with a reliable prefix
    SignatureDescriptor::new(
        "XML",
        Code,
        &[Magic::at(0, b"<?xml"), Magic::at(0, b"\xEF\xBB\xBF<?xml")],
        &["xml", "xsd", "xsl", "svg", "plist", "rss"],
        "application/xml",
    ),
    SignatureDescriptor::new(
        "HTML",
        Code,
        &[
            Magic::at(0, b"<!DOCTYPE html"),
            Magic::at(0, b"<!doctype html"),
            Magic::at(0, b"<html"),
            Magic::at(0, b"<HTML"),
        ],
        &["html", "htm", "xhtml"],
        "text/html",
    ),
    SignatureDescriptor::new("PHP", Code, &[Magic::at(0, b"<?php")], &["php", "phtml"], "application/x-httpd-php"),
    SignatureDescriptor::new(
        "SHEBANG_SCRIPT",
        Code,
        &[Magic::at(0, b"#!")],
        &["sh", "bash", "zsh", "py", "pl", "rb", "js"],
        "text/x-script",
    ),
];

/// Declaration-order ambiguities: `(shadowed, shadowed_by)` on the shared magic number.
const SHADOWED: &[(&str, &str)] = &[("MACHO_FAT", "JAVA_CLASS")];

/// The signature table plus an extension index.
#[derive(Debug)]
pub struct SignatureDatabase {
    descriptors: &'static [SignatureDescriptor],
    by_extension: HashMap<String, Vec<&'static SignatureDescriptor>>,
}

impl SignatureDatabase {
    /// The process-wide database, built on first use and read-only afterwards.
    pub fn global() -> &'static Self {
        static DATABASE: OnceLock<SignatureDatabase> = OnceLock::new();
        DATABASE.get_or_init(|| Self::from_descriptors(SIGNATURES))
    }

    fn from_descriptors(descriptors: &'static [SignatureDescriptor]) -> Self {
        let mut by_extension: HashMap<String, Vec<&'static SignatureDescriptor>> = HashMap::new();
        for descriptor in descriptors {
            for ext in descriptor.extensions {
                by_extension
                    .entry(ext.to_ascii_lowercase())
                    .or_default()
                    .push(descriptor);
            }
        }
        Self {
            descriptors,
            by_extension,
        }
    }

    /// All descriptors, in matching order.
    #[must_use]
    pub const fn descriptors(&self) -> &'static [SignatureDescriptor] {
        self.descriptors
    }

    #[must_use]
    pub fn get(&self, type_id: &str) -> Option<&'static SignatureDescriptor> {
        self.descriptors.iter().find(|d| d.type_id == type_id)
    }

    /// Descriptors registered for an extension (case-insensitive, leading dot optional).
    #[must_use]
    pub fn for_extension(&self, ext: &str) -> &[&'static SignatureDescriptor] {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        self.by_extension.get(&ext).map_or(&[], Vec::as_slice)
    }

    /// Type ids that can never win on their shared magic, paired with the winner.
    #[must_use]
    pub const fn shadowed_type_ids(&self) -> &'static [(&'static str, &'static str)] {
        SHADOWED
    }

    /// Find the first descriptor matching the leading bytes of `bytes`.
    ///
    /// Only `options.max_read_bytes` bytes are considered. A byte-level match on a
    /// descriptor with a structural validator only counts if the validator accepts the
    /// same buffer (when `run_validators` is set).
    #[must_use]
    pub fn match_signature(
        &self,
        bytes: &[u8],
        options: MatchOptions,
    ) -> Option<&'static SignatureDescriptor> {
        let buf = &bytes[..bytes.len().min(options.max_read_bytes)];
        if buf.is_empty() {
            return None;
        }

        self.descriptors.iter().find(|descriptor| {
            if !descriptor.matches_magic(buf) {
                return false;
            }
            match descriptor.validator {
                Some(validator) if options.run_validators => validator(buf),
                _ => true,
            }
        })
    }
}

/// Descriptors registered for `ext` in the global database.
#[must_use]
pub fn descriptors_for_extension(ext: &str) -> &'static [&'static SignatureDescriptor] {
    SignatureDatabase::global().for_extension(ext)
}

/// [`SignatureDatabase::match_signature`] against the global database.
#[must_use]
pub fn match_signature(bytes: &[u8], options: MatchOptions) -> Option<&'static SignatureDescriptor> {
    SignatureDatabase::global().match_signature(bytes, options)
}
