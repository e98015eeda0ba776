//! Command units and the OTB command-line builder

use std::fmt::Display;
use std::path::Path;

/// Per-process resources handed to every OTB application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtbResources {
    /// Value of `-ram` (MB)
    pub ram_mb: u32,
    /// Exported as `ITK_GLOBAL_DEFAULT_NUMBER_OF_THREADS`
    pub threads: u32,
}

impl Default for OtbResources {
    fn default() -> Self {
        Self {
            ram_mb: 4096,
            threads: 1,
        }
    }
}

/// One shell command line run by the scheduler, with the stage title used in
/// progress messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandUnit {
    pub title: String,
    pub command_line: String,
}

impl CommandUnit {
    pub fn new(title: impl Into<String>, command_line: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            command_line: command_line.into(),
        }
    }
}

/// Quote a word for `sh`
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,+@%".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Builder for `otbcli_*` invocations.
///
/// ```ignore
/// let unit = OtbCommand::new("otbcli_BandMath", resources)
///     .paths("-il", &[a, b])
///     .path("-out", &out)
///     .arg("-exp", "im1b1*im2b1")
///     .build("Masking");
/// ```
#[derive(Debug, Clone)]
pub struct OtbCommand {
    application: String,
    resources: OtbResources,
    ram_flag: &'static str,
    args: Vec<String>,
}

impl OtbCommand {
    pub fn new(application: &str, resources: OtbResources) -> Self {
        Self {
            application: application.to_string(),
            resources,
            ram_flag: "-ram",
            args: Vec::new(),
        }
    }

    /// Orthorectification spells the RAM parameter `-opt.ram`
    pub fn ram_flag(mut self, flag: &'static str) -> Self {
        self.ram_flag = flag;
        self
    }

    pub fn arg(mut self, key: &str, value: impl Display) -> Self {
        self.args.push(key.to_string());
        self.args.push(shell_quote(&value.to_string()));
        self
    }

    pub fn path(self, key: &str, path: &Path) -> Self {
        let value = path.to_string_lossy().to_string();
        self.arg(key, value)
    }

    /// A parameter taking a list of files, e.g. `-il a.tif b.tif`
    pub fn paths<P: AsRef<Path>>(mut self, key: &str, paths: &[P]) -> Self {
        self.args.push(key.to_string());
        for path in paths {
            self.args.push(shell_quote(&path.as_ref().to_string_lossy()));
        }
        self
    }

    /// Bare words appended as-is, e.g. a pixel type after `-out`
    pub fn word(mut self, word: &str) -> Self {
        self.args.push(word.to_string());
        self
    }

    pub fn command_line(&self) -> String {
        let mut line = format!(
            "export ITK_GLOBAL_DEFAULT_NUMBER_OF_THREADS={};{} {} {}",
            self.resources.threads, self.application, self.ram_flag, self.resources.ram_mb
        );
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    pub fn build(self, title: &str) -> CommandUnit {
        CommandUnit::new(title, self.command_line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_command_line_layout() {
        let resources = OtbResources { ram_mb: 2048, threads: 3 };
        let unit = OtbCommand::new("otbcli_BandMath", resources)
            .paths("-il", &[PathBuf::from("/a/x.tiff"), PathBuf::from("/a/y z.tiff")])
            .path("-out", Path::new("/a/out.tiff"))
            .arg("-exp", "im1b1*im2b1")
            .build("Masking");

        assert_eq!(unit.title, "Masking");
        assert_eq!(
            unit.command_line,
            "export ITK_GLOBAL_DEFAULT_NUMBER_OF_THREADS=3;otbcli_BandMath -ram 2048 \
             -il /a/x.tiff '/a/y z.tiff' -out /a/out.tiff -exp 'im1b1*im2b1'"
        );
    }

    #[test]
    fn test_ram_flag_override() {
        let line = OtbCommand::new("otbcli_OrthoRectification", OtbResources::default())
            .ram_flag("-opt.ram")
            .command_line();
        assert!(line.ends_with("otbcli_OrthoRectification -opt.ram 4096"));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain.tif"), "plain.tif");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("a?&b"), "'a?&b'");
        assert_eq!(shell_quote(""), "''");
    }
}
