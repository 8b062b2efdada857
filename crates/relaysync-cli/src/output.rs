//! Output formatting

use clap::ValueEnum;
use serde::Serialize;
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn render<T: Serialize + Display>(&self, data: &T) -> anyhow::Result<String> {
        Ok(match self {
            OutputFormat::Text => data.to_string(),
            OutputFormat::Json => serde_json::to_string_pretty(data)?,
            OutputFormat::Yaml => serde_yaml::to_string(data)?,
        })
    }

    pub fn print<T: Serialize + Display>(&self, data: &T) -> anyhow::Result<()> {
        let rendered = self.render(data)?;
        println!("{}", rendered.trim_end());
        Ok(())
    }
}
