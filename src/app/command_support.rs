use crate::app::runtime::AppRuntime;
use crate::config::{load_settings, ConfigError, Settings};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Options that apply to every command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliContext {
    pub config_path: Option<PathBuf>,
}

impl CliContext {
    pub fn load_settings(&self) -> Result<Settings, String> {
        load_settings(self.config_path.as_deref()).map_err(map_config_err)
    }

    pub fn runtime(&self) -> Result<AppRuntime, String> {
        Ok(AppRuntime::new(self.load_settings()?))
    }
}

pub fn map_config_err(err: ConfigError) -> String {
    err.to_string()
}

/// Strips leading global options and returns the remaining command words.
pub fn split_global_options(args: Vec<String>) -> Result<(CliContext, Vec<String>), String> {
    let mut context = CliContext::default();
    let mut rest = args.into_iter();
    let mut remaining = Vec::new();
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--config" => {
                let path = rest
                    .next()
                    .ok_or_else(|| "usage: --config <path>".to_string())?;
                context.config_path = Some(PathBuf::from(path));
            }
            _ => {
                remaining.push(arg);
                remaining.extend(rest);
                break;
            }
        }
    }
    Ok((context, remaining))
}

/// `--flag value` pairs plus positional words. Flags may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagArgs {
    flags: BTreeMap<String, Vec<String>>,
    pub positional: Vec<String>,
}

impl FlagArgs {
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let mut parsed = Self::default();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if let Some(name) = arg.strip_prefix("--") {
                if name.is_empty() {
                    return Err("empty flag name `--`".to_string());
                }
                let value = iter
                    .next()
                    .ok_or_else(|| format!("flag `--{name}` requires a value"))?;
                parsed
                    .flags
                    .entry(name.to_string())
                    .or_default()
                    .push(value.clone());
            } else {
                parsed.positional.push(arg.clone());
            }
        }
        Ok(parsed)
    }

    pub fn optional(&self, name: &str) -> Option<String> {
        self.flags
            .get(name)
            .and_then(|values| values.last())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    pub fn required(&self, name: &str, usage: &str) -> Result<String, String> {
        self.optional(name)
            .ok_or_else(|| format!("missing `--{name}`\nusage: {usage}"))
    }

    pub fn all(&self, name: &str) -> &[String] {
        self.flags.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn reject_unknown(&self, known: &[&str]) -> Result<(), String> {
        match self.flags.keys().find(|name| !known.contains(&name.as_str())) {
            Some(name) => Err(format!("unknown flag `--{name}`")),
            None => Ok(()),
        }
    }
}

pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got `{raw}`")),
    }
}

pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("failed to encode output: {e}"))
}
