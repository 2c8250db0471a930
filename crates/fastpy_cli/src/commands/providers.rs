//! Providers command - List AI backends and their credential status.

use anyhow::Result;
use clap::Args;
use fastpy_ai::BackendRegistry;
use fastpy_core::{BackendProfile, FastpyConfig};
use fastpy_session::ExitCodes;
use serde::Serialize;

#[derive(Args, Debug)]
pub struct ProvidersArgs {
    /// Print as JSON
    #[arg(long)]
    json: bool,
}

/// Read-only view of one backend.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub display_name: String,
    pub model: String,
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_env: Option<String>,
    /// A credential is present, or none is needed.
    pub ready: bool,
    pub default: bool,
}

impl ProviderInfo {
    fn from_profile(
        profile: &BackendProfile,
        default: bool,
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> Self {
        let credential_env = profile.credential.env_var().map(str::to_string);
        let ready = credential_env.is_none() || profile.credential.lookup_with(lookup).is_some();
        Self {
            name: profile.name.clone(),
            display_name: profile.display_name.clone(),
            model: profile.model.clone(),
            base_url: profile.base_url.clone(),
            credential_env,
            ready,
            default,
        }
    }

    fn line(&self) -> String {
        let marker = if self.default { " (default)" } else { "" };
        let status = match (&self.credential_env, self.ready) {
            (None, _) => "no key required".to_string(),
            (Some(var), true) => format!("✅ {} set", var),
            (Some(var), false) => format!("⚠️  {} not set", var),
        };
        format!(
            "   {:<10} {:<28} {}{}",
            self.name, self.model, status, marker
        )
    }
}

/// Every registered backend, resolved against `config`.
pub fn collect(
    config: &FastpyConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Vec<ProviderInfo>> {
    let default = config.profile(None)?.name;
    BackendRegistry::standard()
        .names()
        .into_iter()
        .map(|name| -> Result<ProviderInfo> {
            let profile = config.profile(Some(name))?;
            Ok(ProviderInfo::from_profile(&profile, profile.name == default, &lookup))
        })
        .collect()
}

pub fn execute(args: ProvidersArgs, config: &FastpyConfig) -> Result<u8> {
    let providers = collect(config, |key| std::env::var(key).ok())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&providers)?);
        return Ok(ExitCodes::SUCCESS);
    }

    println!("🔌 AI providers:");
    for provider in &providers {
        println!("{}", provider.line());
    }
    Ok(ExitCodes::SUCCESS)
}
