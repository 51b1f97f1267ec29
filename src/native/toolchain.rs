use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::core::domain::Language;

const SOURCE_PLACEHOLDER: &str = "{source}";
const OUTPUT_PLACEHOLDER: &str = "{output}";

/// A compiler program plus its argument template. `{source}` and `{output}`
/// are substituted with the workspace paths.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Toolchain {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Toolchain {
    pub fn new<P, I, S>(program: P, args: I) -> Self
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.as_ref().into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn gnu_cpp(program: impl AsRef<Path>) -> Self {
        Self::new(
            program,
            ["{source}", "-o", "{output}", "-std=c++17", "-O2"],
        )
    }

    pub fn gnu_c(program: impl AsRef<Path>) -> Self {
        Self::new(program, ["{source}", "-o", "{output}", "-std=c11", "-O2", "-lm"])
    }

    pub fn render_args(&self, source: &Path, output: &Path) -> Vec<OsString> {
        self.args
            .iter()
            .map(|arg| match arg.as_str() {
                SOURCE_PLACEHOLDER => source.as_os_str().to_owned(),
                OUTPUT_PLACEHOLDER => output.as_os_str().to_owned(),
                _ => OsString::from(arg),
            })
            .collect()
    }
}

/// Capability lookup keyed by language.
#[derive(Clone, Debug, Default)]
pub struct Toolchains {
    by_language: HashMap<Language, Toolchain>,
}

impl Toolchains {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gnu(gnucpp_path: impl AsRef<Path>, gnuc_path: impl AsRef<Path>) -> Self {
        Self::new()
            .with(Language::GnuCpp, Toolchain::gnu_cpp(gnucpp_path))
            .with(Language::GnuC, Toolchain::gnu_c(gnuc_path))
    }

    pub fn with(mut self, language: Language, toolchain: Toolchain) -> Self {
        self.by_language.insert(language, toolchain);
        self
    }

    pub fn get(&self, language: &Language) -> Option<&Toolchain> {
        self.by_language.get(language)
    }
}
