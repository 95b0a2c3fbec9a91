//! Configuration management for the CRM client
//!
//! This module provides utilities for loading and validating client
//! configuration, with support for environment variables.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};

/// Base trait for configuration providers
pub trait ConfigProvider: Send + Sync {
    /// Get a string configuration value
    fn get_string(&self, key: &str) -> Result<String>;
}

/// Extension methods for configuration providers
pub trait ConfigProviderExt: ConfigProvider {
    /// Get an integer configuration value
    fn get_int(&self, key: &str) -> Result<i64> {
        let value = self.get_string(key)?;
        value.parse::<i64>().map_err(|e| {
            ServiceError::configuration(format!("Invalid integer for key {}: {}", key, e))
        })
    }

    /// Get a boolean configuration value
    fn get_bool(&self, key: &str) -> Result<bool> {
        let value = self.get_string(key)?;
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Ok(true),
            "false" | "no" | "0" | "off" => Ok(false),
            _ => Err(ServiceError::configuration(format!(
                "Invalid boolean value for key {}: {}",
                key, value
            ))),
        }
    }

    /// Get a string configuration value with a default
    fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|_| default.to_string())
    }

    /// Get an integer configuration value with a default
    fn get_int_or(&self, key: &str, default: i64) -> i64 {
        self.get_int(key).unwrap_or(default)
    }
}

impl<T: ConfigProvider + ?Sized> ConfigProviderExt for T {}

/// Environment variable based configuration provider
#[derive(Debug, Clone, Default)]
pub struct EnvConfigProvider {
    /// Optional prefix for environment variables
    prefix: Option<String>,
}

impl EnvConfigProvider {
    /// Create a new environment variable config provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a prefix for environment variables
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Format a configuration key as an environment variable
    fn format_key(&self, key: &str) -> String {
        let mut env_key = String::new();

        if let Some(ref prefix) = self.prefix {
            env_key.push_str(prefix);
            env_key.push('_');
        }

        env_key.push_str(
            &key.to_uppercase()
                .replace(|c: char| !c.is_ascii_alphanumeric(), "_"),
        );
        env_key
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        let env_key = self.format_key(key);

        env::var(&env_key).map_err(|e| match e {
            env::VarError::NotPresent => {
                ServiceError::configuration(format!("Environment variable not set: {}", env_key))
            }
            env::VarError::NotUnicode(_) => ServiceError::configuration(format!(
                "Environment variable is not valid unicode: {}",
                env_key
            )),
        })
    }
}

/// In-memory config provider for testing or static configuration
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigProvider {
    values: HashMap<String, String>,
}

impl MemoryConfigProvider {
    /// Create a new empty memory config provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a configuration value
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: ToString,
    {
        self.values.insert(key.into(), value.to_string());
    }
}

impl ConfigProvider for MemoryConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| ServiceError::configuration(format!("Configuration key not found: {}", key)))
    }
}

/// A composite config provider that tries multiple providers in order
#[derive(Default)]
pub struct CompositeConfigProvider {
    providers: Vec<Box<dyn ConfigProvider>>,
}

impl CompositeConfigProvider {
    /// Create a new composite config provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider to the chain
    pub fn add_provider(&mut self, provider: Box<dyn ConfigProvider>) {
        self.providers.push(provider);
    }
}

impl ConfigProvider for CompositeConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        for provider in &self.providers {
            if let Ok(value) = provider.get_string(key) {
                return Ok(value);
            }
        }

        Err(ServiceError::configuration(format!(
            "Configuration key not found in any provider: {}",
            key
        )))
    }
}

/// Global default configuration provider
pub static DEFAULT_PROVIDER: Lazy<Arc<EnvConfigProvider>> =
    Lazy::new(|| Arc::new(EnvConfigProvider::new().with_prefix("CRM")));

/// Configuration for the CRM client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    /// API key
    pub api_key: String,

    /// Base URL for the CRM API
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Number of batch items dispatched concurrently per window
    pub batch_window_size: usize,

    /// Delay between batch windows, in milliseconds
    pub batch_window_delay_ms: u64,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.attio.com/v2".to_string(),
            timeout_seconds: 30,
            batch_window_size: 5,
            batch_window_delay_ms: 200,
        }
    }
}

impl CrmConfig {
    /// Load configuration from a config provider
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> Result<Self> {
        let defaults = CrmConfig::default();

        // Unsigned settings must reject negatives before the cast, which
        // would otherwise wrap them into huge values.
        let int_setting = |key: &str, default: i64| -> Result<i64> {
            let value = provider.get_int_or(key, default);
            if value < 0 {
                return Err(ServiceError::configuration(format!(
                    "{} must not be negative, got {}",
                    key, value
                )));
            }
            Ok(value)
        };

        let config = Self {
            api_key: provider.get_string("api_key")?,
            base_url: provider.get_string_or("base_url", &defaults.base_url),
            timeout_seconds: int_setting("timeout_seconds", defaults.timeout_seconds as i64)?
                as u64,
            batch_window_size: int_setting("batch_window_size", defaults.batch_window_size as i64)?
                as usize,
            batch_window_delay_ms: int_setting(
                "batch_window_delay_ms",
                defaults.batch_window_delay_ms as i64,
            )? as u64,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate this configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(ServiceError::configuration("CRM API key is required"));
        }
        if self.base_url.is_empty() {
            return Err(ServiceError::configuration("CRM base URL is required"));
        }
        if url::Url::parse(&self.base_url).is_err() {
            return Err(ServiceError::configuration(format!(
                "CRM base URL is not a valid URL: {}",
                self.base_url
            )));
        }
        if self.batch_window_size == 0 {
            return Err(ServiceError::configuration(
                "Batch window size must be at least 1",
            ));
        }
        Ok(())
    }
}
