//! One-time platform checks run before any OCR engine is created.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::config::ServerConfig;

const UNKNOWN: &str = "unknown";
const OS_RELEASE_FILES: &[&str] = &["/etc/os-release", "/usr/lib/os-release"];
const REDHAT_RELEASE_FILE: &str = "/etc/redhat-release";

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Unknown operating system: {0}")]
    UnknownOs(String),
    #[error("Unknown CPU architecture: {0}")]
    UnknownArch(String),
    #[error("OCR data directory {0} does not exist")]
    MissingTessdata(PathBuf),
    #[error("OCR language data {0} not found")]
    MissingLanguage(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinuxRelease {
    pub id: String,
    pub version: Option<String>,
    /// `ID` followed by every `ID_LIKE` entry, without duplicates.
    pub like: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: &'static str,
    pub arch: &'static str,
    pub bitness: u32,
    pub release: Option<LinuxRelease>,
}

impl Platform {
    /// `<os>-<arch>`, e.g. `linux-x86_64`.
    pub fn classifier(&self) -> String {
        format!("{}-{}", self.os, self.arch)
    }
}

/// Detect the host platform, verify the OCR language data, and log both.
pub fn initialize(config: &ServerConfig) -> Result<Platform, PlatformError> {
    let platform = detect(
        std::env::consts::OS,
        std::env::consts::ARCH,
        config.platform.allow_unknown,
    )?;
    info!(
        classifier = %platform.classifier(),
        bitness = platform.bitness,
        release = platform.release.as_ref().map(|r| r.id.as_str()),
        release_version = platform.release.as_ref().and_then(|r| r.version.as_deref()),
        "platform detected"
    );

    let traineddata = verify_tessdata(&config.ocr.tessdata_dir, &config.ocr.language)?;
    info!(path = %traineddata.display(), "OCR language data found");
    Ok(platform)
}

pub fn detect(os: &str, arch: &str, allow_unknown: bool) -> Result<Platform, PlatformError> {
    let detected_os = normalize_os(os);
    let detected_arch = normalize_arch(arch);
    if !allow_unknown {
        if detected_os == UNKNOWN {
            return Err(PlatformError::UnknownOs(os.to_string()));
        }
        if detected_arch == UNKNOWN {
            return Err(PlatformError::UnknownArch(arch.to_string()));
        }
    }

    let release = if detected_os == "linux" { linux_release() } else { None };
    Ok(Platform {
        os: detected_os,
        arch: detected_arch,
        bitness: bitness(detected_arch),
        release,
    })
}

/// The directory must exist and hold `<language>.traineddata`.
pub fn verify_tessdata(dir: &Path, language: &str) -> Result<PathBuf, PlatformError> {
    if !dir.is_dir() {
        return Err(PlatformError::MissingTessdata(dir.to_path_buf()));
    }
    let traineddata = dir.join(format!("{language}.traineddata"));
    if !traineddata.is_file() {
        return Err(PlatformError::MissingLanguage(traineddata));
    }
    Ok(traineddata)
}

fn normalize(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

const OS_PREFIXES: &[(&str, &str)] = &[
    ("aix", "aix"),
    ("hpux", "hpux"),
    ("linux", "linux"),
    ("macos", "osx"),
    ("osx", "osx"),
    ("darwin", "osx"),
    ("freebsd", "freebsd"),
    ("openbsd", "openbsd"),
    ("netbsd", "netbsd"),
    ("solaris", "sunos"),
    ("sunos", "sunos"),
    ("illumos", "sunos"),
    ("windows", "windows"),
    ("zos", "zos"),
];

pub fn normalize_os(value: &str) -> &'static str {
    let value = normalize(value);
    OS_PREFIXES
        .iter()
        .find(|(prefix, _)| value.starts_with(prefix))
        .map_or(UNKNOWN, |(_, name)| *name)
}

pub fn normalize_arch(value: &str) -> &'static str {
    match normalize(value).as_str() {
        "x8664" | "amd64" | "ia32e" | "em64t" | "x64" => "x86_64",
        "x8632" | "x86" | "i386" | "i486" | "i586" | "i686" | "ia32" | "x32" => "x86_32",
        "ia64" | "ia64w" | "itanium64" => "itanium_64",
        "sparc" | "sparc32" => "sparc_32",
        "sparcv9" | "sparc64" => "sparc_64",
        "arm" | "arm32" => "arm_32",
        "aarch64" => "aarch_64",
        "mips" | "mips32" => "mips_32",
        "mips64" => "mips_64",
        "ppc" | "ppc32" | "powerpc" => "ppc_32",
        "ppc64" | "powerpc64" => "ppc_64",
        "ppc64le" | "powerpc64le" => "ppcle_64",
        "s390" => "s390_32",
        "s390x" => "s390_64",
        "riscv64" => "riscv_64",
        _ => UNKNOWN,
    }
}

/// Unrecognized architectures fall back to this build's pointer width.
fn bitness(arch: &str) -> u32 {
    if arch == UNKNOWN {
        usize::BITS
    } else if arch.ends_with("64") {
        64
    } else {
        32
    }
}

fn linux_release() -> Option<LinuxRelease> {
    OS_RELEASE_FILES
        .iter()
        .filter_map(|path| std::fs::read_to_string(path).ok())
        .find_map(|content| parse_os_release(&content))
        .or_else(|| {
            std::fs::read_to_string(REDHAT_RELEASE_FILE)
                .ok()
                .and_then(|content| parse_redhat_release(&content))
        })
}

/// Parse `ID`, `ID_LIKE` and `VERSION_ID` out of an os-release file.
pub fn parse_os_release(content: &str) -> Option<LinuxRelease> {
    let unquote = |v: &str| v.trim().replace('"', "");
    let mut id = None;
    let mut version = None;
    let mut like: Vec<String> = Vec::new();

    for line in content.lines() {
        if let Some(v) = line.strip_prefix("ID=") {
            let v = unquote(v);
            like.insert(0, v.clone());
            id = Some(v);
        } else if let Some(v) = line.strip_prefix("VERSION_ID=") {
            version = Some(unquote(v));
        } else if let Some(v) = line.strip_prefix("ID_LIKE=") {
            like.extend(unquote(v).split_whitespace().map(str::to_string));
        }
    }
    let mut seen = std::collections::HashSet::new();
    like.retain(|l| seen.insert(l.clone()));

    Some(LinuxRelease { id: id?, version, like })
}

/// Older Red Hat family systems only ship `/etc/redhat-release`.
pub fn parse_redhat_release(content: &str) -> Option<LinuxRelease> {
    let line = content.lines().next()?.to_lowercase();
    let id = ["centos", "fedora"]
        .into_iter()
        .find(|name| line.contains(name))
        .or_else(|| line.contains("red hat enterprise linux").then_some("rhel"))?;
    let version = line
        .split(|c: char| !c.is_ascii_digit())
        .find(|s| !s.is_empty())
        .map(str::to_string);

    let mut like = vec!["rhel".to_string(), "fedora".to_string()];
    if !like.iter().any(|l| l == id) {
        like.push(id.to_string());
    }
    Some(LinuxRelease { id: id.to_string(), version, like })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_rust_target_names() {
        assert_eq!(normalize_os("linux"), "linux");
        assert_eq!(normalize_os("macos"), "osx");
        assert_eq!(normalize_os("Windows 10"), "windows");
        assert_eq!(normalize_os("plan9"), UNKNOWN);

        assert_eq!(normalize_arch("x86_64"), "x86_64");
        assert_eq!(normalize_arch("aarch64"), "aarch_64");
        assert_eq!(normalize_arch("x86"), "x86_32");
        assert_eq!(normalize_arch("powerpc64le"), "ppcle_64");
        assert_eq!(normalize_arch("wasm32"), UNKNOWN);
    }

    #[test]
    fn detect_builds_classifier_and_bitness() {
        let p = detect("windows", "x86_64", false).unwrap();
        assert_eq!(p.classifier(), "windows-x86_64");
        assert_eq!(p.bitness, 64);
        assert_eq!(p.release, None);

        let p = detect("freebsd", "arm", false).unwrap();
        assert_eq!(p.classifier(), "freebsd-arm_32");
        assert_eq!(p.bitness, 32);
    }

    #[test]
    fn unknown_platform_fails_unless_allowed() {
        assert!(matches!(detect("plan9", "x86_64", false), Err(PlatformError::UnknownOs(_))));
        assert!(matches!(detect("linux", "wasm32", false), Err(PlatformError::UnknownArch(_))));
        let p = detect("plan9", "wasm32", true).unwrap();
        assert_eq!(p.classifier(), "unknown-unknown");
        assert_eq!(p.bitness, usize::BITS);
    }

    #[test]
    fn parses_os_release() {
        let content = "NAME=\"Ubuntu\"\nID=ubuntu\nID_LIKE=debian\nVERSION_ID=\"22.04\"\n";
        let r = parse_os_release(content).unwrap();
        assert_eq!(r.id, "ubuntu");
        assert_eq!(r.version.as_deref(), Some("22.04"));
        assert_eq!(r.like, ["ubuntu", "debian"]);

        let content = "ID=\"rocky\"\nID_LIKE=\"rhel centos fedora\"\n";
        let r = parse_os_release(content).unwrap();
        assert_eq!(r.like, ["rocky", "rhel", "centos", "fedora"]);
        assert_eq!(r.version, None);

        assert_eq!(parse_os_release("NAME=thing\n"), None);
    }

    #[test]
    fn parses_redhat_release() {
        let r = parse_redhat_release("CentOS release 6.10 (Final)\n").unwrap();
        assert_eq!(r.id, "centos");
        assert_eq!(r.version.as_deref(), Some("6"));
        assert_eq!(r.like, ["rhel", "fedora", "centos"]);

        let r = parse_redhat_release("Red Hat Enterprise Linux Server release 7.9 (Maipo)").unwrap();
        assert_eq!(r.id, "rhel");
        assert_eq!(r.like, ["rhel", "fedora"]);

        assert_eq!(parse_redhat_release("Slackware 15.0"), None);
    }

    #[test]
    fn tessdata_must_hold_the_language() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            verify_tessdata(&dir.path().join("missing"), "e13b"),
            Err(PlatformError::MissingTessdata(_))
        ));
        assert!(matches!(
            verify_tessdata(dir.path(), "e13b"),
            Err(PlatformError::MissingLanguage(_))
        ));

        std::fs::write(dir.path().join("e13b.traineddata"), b"").unwrap();
        let found = verify_tessdata(dir.path(), "e13b").unwrap();
        assert_eq!(found, dir.path().join("e13b.traineddata"));
    }
}
