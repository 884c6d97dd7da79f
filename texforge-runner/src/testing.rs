//! Test support
//!
//! A fake toolchain made of small `/bin/sh` scripts standing in for the
//! document compilers and bibliography tools, plus an in-memory archive
//! builder. Exported behind the `test-support` feature for other crates'
//! tests.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;

/// Builds a zip archive in memory; names ending in `/` become directories
pub fn archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().unix_permissions(0o644);

    for (name, data) in entries {
        if name.ends_with('/') {
            writer
                .add_directory(*name, options.unix_permissions(0o755))
                .expect("add directory");
        } else {
            writer.start_file(*name, options).expect("start file");
            writer.write_all(data).expect("write entry");
        }
    }

    writer.finish().expect("finish archive").into_inner()
}

#[cfg(unix)]
pub use fake::FakeToolchain;

/// Script bodies for [`FakeToolchain::install`]
///
/// Engine scripts take the main file as their last argument and write
/// `<base>.pdf` into the working directory like a real toolchain would.
#[cfg(unix)]
pub mod scripts {
    /// Renders the document
    pub const ENGINE: &str = r#"for last; do :; done
base=$(basename "$last" .tex)
echo "This is a fake engine, rendering $last"
printf '%%PDF-1.4 fake\n' > "$base.pdf"
"#;

    /// Renders the document and asks for biber through a `.bcf` file
    pub const ENGINE_WITH_BCF: &str = r#"for last; do :; done
base=$(basename "$last" .tex)
: > "$base.bcf"
printf '%%PDF-1.4 fake\n' > "$base.pdf"
"#;

    /// Renders the document and asks for bibtex through the `.aux` file
    pub const ENGINE_WITH_BIBDATA: &str = r#"for last; do :; done
base=$(basename "$last" .tex)
printf '%s\n' '\relax' '\bibstyle{plain}' '\bibdata{refs}' > "$base.aux"
printf '%%PDF-1.4 fake\n' > "$base.pdf"
"#;

    /// Exits cleanly without rendering anything
    pub const ENGINE_WITHOUT_PDF: &str = r#"echo "No pages of output."
"#;

    /// Fails every time
    pub const FAIL: &str = r#"echo "I couldn't open database file refs.bib" >&2
exit 2
"#;

    /// Never exits on its own
    pub const HANG: &str = r#"exec sleep 30
"#;

    /// Renders normally except on the given pass, which fails
    pub fn engine_failing_on_pass(pass: usize) -> String {
        format!(
            r#"n=$(cat .passes 2>/dev/null || echo 0)
n=$((n + 1))
echo "$n" > .passes
if [ "$n" -eq {pass} ]; then
  echo "! Undefined control sequence."
  exit 1
fi
{engine}"#,
            pass = pass,
            engine = ENGINE
        )
    }
}

#[cfg(unix)]
mod fake {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    use super::scripts;
    use crate::config::{ArchiveLimits, BIBER_BINARY, BIBTEX_BINARY, RunnerConfig};
    use texforge_core::domain::job::Toolchain;

    /// Directory of fake toolchain binaries
    ///
    /// Every script appends `<name> <args>` to an invocation log before
    /// running its body.
    pub struct FakeToolchain {
        dir: tempfile::TempDir,
    }

    impl FakeToolchain {
        /// Every engine renders; both bibliography tools succeed silently
        pub fn new() -> Self {
            let toolchain = Self {
                dir: tempfile::tempdir().expect("create toolchain dir"),
            };
            for engine in Toolchain::ALL {
                toolchain.install(engine.as_str(), scripts::ENGINE);
            }
            toolchain.install(BIBER_BINARY, "");
            toolchain.install(BIBTEX_BINARY, "");
            toolchain
        }

        pub fn bin_dir(&self) -> &Path {
            self.dir.path()
        }

        /// Runner configuration resolving binaries from this toolchain
        pub fn config(&self) -> RunnerConfig {
            RunnerConfig::new(Some(self.bin_dir().to_path_buf()), ArchiveLimits::default())
        }

        /// Installs (or replaces) the script behind `name`
        pub fn install(&self, name: &str, body: &str) {
            let script = format!(
                "#!/bin/sh\nprintf '%s\\n' \"{name} $*\" >> '{log}'\n{body}",
                name = name,
                log = self.invocation_log().display(),
                body = body
            );
            let path = self.bin_dir().join(name);
            let staging = self.bin_dir().join(format!(".{}.tmp", name));
            fs::write(&staging, script).expect("write script");
            fs::set_permissions(&staging, fs::Permissions::from_mode(0o755))
                .expect("chmod script");
            fs::rename(&staging, &path).expect("install script");
        }

        /// Every recorded call, oldest first
        pub fn invocations(&self) -> Vec<String> {
            fs::read_to_string(self.invocation_log())
                .unwrap_or_default()
                .lines()
                .map(str::to_string)
                .collect()
        }

        fn invocation_log(&self) -> PathBuf {
            self.bin_dir().join("invocations.log")
        }
    }

    impl Default for FakeToolchain {
        fn default() -> Self {
            Self::new()
        }
    }
}
