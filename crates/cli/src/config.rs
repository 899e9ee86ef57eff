use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use callgraph_core::analysis::AnalysisConfig;
use callgraph_core::model::MapSymbolProvider;
use callgraph_protocol::TimeUnit;
use serde::Deserialize;

/// Settings read from the `--config` TOML file.
///
/// ```toml
/// time_unit = "microseconds"
///
/// [analysis]
/// max_depth = 16
/// kernel_statuses = false
///
/// [symbols]
/// 0x401000 = "main"
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub time_unit: TimeUnit,
    pub analysis: AnalysisConfig,
    /// Address (decimal or `0x` hexadecimal) to function name.
    pub symbols: BTreeMap<String, String>,
}

impl CliConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn symbol_provider(&self) -> Result<MapSymbolProvider> {
        let mut provider = MapSymbolProvider::new();
        for (address, name) in &self.symbols {
            provider.insert(parse_address(address)?, name.as_str());
        }
        Ok(provider)
    }
}

fn parse_address(text: &str) -> Result<u64> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    match parsed {
        Ok(address) => Ok(address),
        Err(error) => bail!("invalid symbol address {text:?}: {error}"),
    }
}
