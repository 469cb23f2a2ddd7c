mod driver;
mod gcc;
mod golang;
mod java;
mod javascript;
mod python;

pub use driver::{DriverError, LanguageDriver, Prepared};
pub use java::extract_class_name;

use serde::Serialize;

/// The set of languages the engine can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    Golang,
    Java,
    C,
    Cpp,
}

impl Language {
    /// Parse a user-supplied tag, accepting the common aliases. Anything
    /// else is unsupported.
    pub fn from_tag(tag: &str) -> Option<Language> {
        match tag.to_ascii_lowercase().as_str() {
            "python" => Some(Language::Python),
            "javascript" | "js" => Some(Language::JavaScript),
            "golang" | "go" => Some(Language::Golang),
            "java" => Some(Language::Java),
            "c" => Some(Language::C),
            "cpp" | "c++" => Some(Language::Cpp),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::Golang => "golang",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Language::Python => "Python",
            Language::JavaScript => "JavaScript",
            Language::Golang => "Go",
            Language::Java => "Java",
            Language::C => "C",
            Language::Cpp => "C++",
        }
    }

    pub fn all() -> [Language; 6] {
        [
            Language::Python,
            Language::JavaScript,
            Language::Golang,
            Language::Java,
            Language::C,
            Language::Cpp,
        ]
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatch to the driver owning one language's preparation and limits.
pub fn driver_for(language: Language) -> &'static dyn LanguageDriver {
    match language {
        Language::Python => &python::PythonDriver,
        Language::JavaScript => &javascript::JavaScriptDriver,
        Language::Golang => &golang::GolangDriver,
        Language::Java => &java::JavaDriver,
        Language::C => &gcc::C_DRIVER,
        Language::Cpp => &gcc::CPP_DRIVER,
    }
}
