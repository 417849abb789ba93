//! The outside world as seen by the `print` and `load` builtins.
//!
//! [`StdHost`] is what the interactive binary uses. [`MemoryHost`] keeps
//! everything in memory, which makes it the natural choice for tests and for
//! embedders that want to capture output.

use std::cell::RefCell;
use std::collections::HashMap;
use std::{fs, io};

/// Source of loadable text and sink for displayed lines
pub trait Host {
    /// Read the complete text of the source called `name`
    fn read_source(&self, name: &str) -> io::Result<String>;

    /// Show one line of output
    fn display(&self, text: &str);
}

/// Reads sources from the filesystem and prints to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct StdHost;

impl Host for StdHost {
    fn read_source(&self, name: &str) -> io::Result<String> {
        fs::read_to_string(name)
    }

    fn display(&self, text: &str) {
        println!("{text}");
    }
}

/// In-memory sources and captured output
#[derive(Debug, Default)]
pub struct MemoryHost {
    sources: HashMap<String, String>,
    output: RefCell<Vec<String>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        MemoryHost::default()
    }

    /// Make `source` loadable under `name`
    pub fn with_source(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.sources.insert(name.into(), source.into());
        self
    }

    /// Lines displayed so far, oldest first
    pub fn output(&self) -> Vec<String> {
        self.output.borrow().clone()
    }
}

impl Host for MemoryHost {
    fn read_source(&self, name: &str) -> io::Result<String> {
        self.sources.get(name).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no source named {name}"))
        })
    }

    fn display(&self, text: &str) {
        self.output.borrow_mut().push(text.to_owned());
    }
}
