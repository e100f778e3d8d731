use std::collections::HashMap;

use crate::error::{RelayError, Result};

/// Item `count` per category, with a default for everything unlisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSizeTable {
    default: u32,
    overrides: HashMap<u32, u32>,
}

impl PageSizeTable {
    pub fn new(default: u32) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, category: u32, count: u32) -> Self {
        self.overrides.insert(category, count);
        self
    }

    /// Parse `category=count` pairs separated by commas
    pub fn parse(raw: &str, default: u32) -> Result<Self> {
        let mut table = Self::new(default);

        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (category, count) = entry.split_once('=').ok_or_else(|| {
                RelayError::InvalidConfig(format!("page size entry must be category=count: {}", entry))
            })?;

            let category = category.trim().parse().map_err(|_| {
                RelayError::InvalidConfig(format!("invalid page size category: {}", category))
            })?;
            let count = count.trim().parse().map_err(|_| {
                RelayError::InvalidConfig(format!("invalid page size count: {}", count))
            })?;

            table.overrides.insert(category, count);
        }

        Ok(table)
    }

    pub fn count_for(&self, category: u32) -> u32 {
        self.overrides.get(&category).copied().unwrap_or(self.default)
    }
}

impl Default for PageSizeTable {
    fn default() -> Self {
        Self::new(5000).with_override(440, 3000)
    }
}
