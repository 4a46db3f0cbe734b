//! Phone/state symbol vocabulary.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::info;

use crate::error::{Error, Result};

/// End-of-sequence sentinel, appended first.
pub const EOS: &str = "<EOS>";
/// Start-of-sequence sentinel, appended after [`EOS`].
pub const SOS: &str = "<SOS>";

/// Ordered symbol list with a symbol to index bijection.
#[derive(Debug, Clone, Default)]
pub struct PhoneVocabulary {
    symbols: Vec<String>,
    index: HashMap<String, u32>,
}

impl PhoneVocabulary {
    /// Loads one symbol per line from `path`.
    pub fn load<P: AsRef<Path>>(path: P, add_start_end: bool) -> Result<Self> {
        let path = path.as_ref();
        let vocab = Self::from_reader(BufReader::new(File::open(path)?), add_start_end)?;
        info!(
            path = %path.display(),
            symbols = vocab.len(),
            "vocabulary loaded"
        );
        Ok(vocab)
    }

    /// Reads one symbol per line; trailing whitespace is trimmed.
    pub fn from_reader<R: BufRead>(reader: R, add_start_end: bool) -> Result<Self> {
        let mut symbols = Vec::new();
        for line in reader.lines() {
            symbols.push(line?.trim_end().to_string());
        }
        Self::from_symbols(symbols, add_start_end)
    }

    /// Builds a vocabulary from symbols in index order.
    pub fn from_symbols<I, S>(symbols: I, add_start_end: bool) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocab = Self::default();
        for symbol in symbols {
            vocab.push(symbol.into())?;
        }
        if add_start_end {
            vocab.push(EOS.to_string())?;
            vocab.push(SOS.to_string())?;
        }
        Ok(vocab)
    }

    fn push(&mut self, symbol: String) -> Result<()> {
        if self.index.contains_key(&symbol) {
            return Err(Error::DuplicateSymbol(symbol));
        }
        self.index.insert(symbol.clone(), self.symbols.len() as u32);
        self.symbols.push(symbol);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Looks up the index of `symbol`.
    pub fn index_of(&self, symbol: &str) -> Result<u32> {
        self.index
            .get(symbol)
            .copied()
            .ok_or_else(|| Error::UnknownSymbol(symbol.to_string()))
    }

    /// Looks up the symbol at `index`.
    pub fn symbol(&self, index: u32) -> Option<&str> {
        self.symbols.get(index as usize).map(String::as_str)
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }
}
