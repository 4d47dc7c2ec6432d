use anyhow::Result;

use crate::commands::CommandReport;
use crate::engine::config::ProvidersConfig;
use crate::providers::remote::RemoteProvider;
use crate::providers::resolve::{
    api_key_vars, effective_specs, resolve_api_key, resolve_compatible_base_url,
};

pub fn check(cfg: &ProvidersConfig) -> CommandReport {
    let mut report = CommandReport::new("providers");
    let specs = match effective_specs(cfg) {
        Ok(specs) => specs,
        Err(err) => {
            report.issue(err.to_string());
            return report;
        }
    };

    let source = if cfg.chain.is_empty() {
        "auto-detected"
    } else {
        "configured"
    };
    report.detail(format!("chain={source} entries={}", specs.len()));
    for (position, spec) in specs.iter().enumerate() {
        let role = if position == 0 { "primary" } else { "fallback" };
        let credentials = if resolve_api_key(spec.provider).is_some() {
            "present"
        } else {
            "missing"
        };
        let mut line = format!(
            "{}. {role} provider={} model={} credentials={credentials}",
            position + 1,
            spec.provider.label(),
            spec.model
        );
        if spec.provider == RemoteProvider::OpenAiCompatible {
            let base = resolve_compatible_base_url(spec)
                .unwrap_or_else(|| "https://api.openai.com".to_string());
            line.push_str(&format!(" base_url={base}"));
        }
        report.detail(line);
        if credentials == "missing" {
            report.issue(format!(
                "{} has no credentials; set {}",
                spec.provider.label(),
                api_key_vars(spec.provider).join(" or ")
            ));
        }
    }
    report
}

pub fn run() -> Result<CommandReport> {
    let cfg = crate::engine::config::load_config()?;
    Ok(check(&cfg.providers))
}
