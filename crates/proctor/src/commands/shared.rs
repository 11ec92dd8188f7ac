//! Helpers shared by the CLI subcommands

use proctor_core::es_client::HttpEsClient;
use proctor_core::providers::{ProviderContext, ProviderRegistry};
use serde_json::{json, Map, Value};

/// Registry of providers the CLI ships with
///
/// Configs name the providers they use; this supplies the factories for the
/// built-in ones. Embedders wanting their own providers use the library
/// directly and assemble their own registry.
pub fn builtin_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register_service("es", |ctx: ProviderContext| async move {
        let config = ctx
            .get_service_as::<proctor_core::config::Config>("config")
            .await?;
        Ok(HttpEsClient::from_config(&config))
    });
    registry
}

/// Translate run flags into config overrides
pub fn overrides_from_flags(
    include_tag: &[String],
    exclude_tag: &[String],
    dry_run: bool,
) -> Value {
    let mut overrides = Map::new();

    let mut suite_tags = Map::new();
    if !include_tag.is_empty() {
        suite_tags.insert("include".to_string(), json!(include_tag));
    }
    if !exclude_tag.is_empty() {
        suite_tags.insert("exclude".to_string(), json!(exclude_tag));
    }
    if !suite_tags.is_empty() {
        overrides.insert("suiteTags".to_string(), Value::Object(suite_tags));
    }

    if dry_run {
        overrides.insert("runnerOpts".to_string(), json!({ "dryRun": true }));
    }

    if overrides.is_empty() {
        Value::Null
    } else {
        Value::Object(overrides)
    }
}
