//! Extension registration
//!
//! An extension is an initializer resolved by identifier through the
//! [`ExtensionRegistry`]. The initializer receives an [`ExtensionContext`]
//! and registers its listeners synchronously; nothing else is retained.
//!
//! Listeners registered by an initializer that then fails are discarded, so a
//! half-initialised extension never receives events.

use crate::config::{Config, ExtensionSpec};
use crate::error::KemptError;
use crate::events::{names, Event, EventBus, HandlerError, HandlerResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, debug_span, info, warn};

/// Signature every extension implements.
pub type ExtensionInit =
    Arc<dyn Fn(&mut ExtensionContext<'_>) -> Result<(), HandlerError> + Send + Sync>;

/// What an extension sees while it initialises.
pub struct ExtensionContext<'a> {
    id: &'a str,
    bus: &'a mut EventBus,
    pub config: &'a Config,
    pub options: &'a Value,
}

impl<'a> ExtensionContext<'a> {
    pub fn id(&self) -> &str {
        self.id
    }

    /// Register a listener. Handler invocations run inside a tracing span
    /// carrying the extension id.
    pub fn on<F>(&mut self, pattern: &str, handler: F)
    where
        F: Fn(&mut Event<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        let id = self.id.to_string();
        self.bus.on(self.id, pattern, move |event| {
            let span = debug_span!("extension", id = %id);
            let _enter = span.enter();
            handler(event)
        });
    }

    /// String option, if present.
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }
}

/// Identifier → initializer table.
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    initializers: BTreeMap<String, ExtensionInit>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in extensions.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(builtin::EVENT_LOG, builtin::event_log);
        registry.register(builtin::FINAL_NEWLINE, builtin::final_newline);
        registry.register(builtin::LICENSE_HEADER, builtin::license_header);
        registry
    }

    pub fn register<F>(&mut self, id: &str, init: F)
    where
        F: Fn(&mut ExtensionContext<'_>) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.initializers.insert(id.to_string(), Arc::new(init));
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.initializers.keys().map(String::as_str)
    }

    /// Initialise one extension into `bus`.
    pub fn load(&self, spec: &ExtensionSpec, config: &Config, bus: &mut EventBus) -> Result<(), KemptError> {
        let init = self
            .initializers
            .get(&spec.id)
            .ok_or_else(|| KemptError::ExtensionLoad {
                id: spec.id.clone(),
                reason: "no extension registered under this identifier".to_string(),
            })?;

        let mut staged = EventBus::new();
        let mut ctx = ExtensionContext {
            id: &spec.id,
            bus: &mut staged,
            config,
            options: &spec.options,
        };
        init(&mut ctx).map_err(|e| KemptError::ExtensionLoad {
            id: spec.id.clone(),
            reason: e.to_string(),
        })?;

        debug!(extension = %spec.id, listeners = staged.listener_count(), "Extension initialised");
        bus.absorb(staged);
        Ok(())
    }

    /// Initialise every configured extension in order. Failures are logged
    /// and skipped; the ids that loaded are returned.
    pub fn load_all(&self, config: &Config, bus: &mut EventBus) -> Vec<String> {
        let mut loaded = Vec::new();
        for spec in &config.extensions {
            match self.load(spec, config, bus) {
                Ok(()) => {
                    info!(extension = %spec.id, "Loaded extension");
                    bus.notify(Event::PluginLoaded { path: &spec.id });
                    loaded.push(spec.id.clone());
                }
                Err(e) => warn!(extension = %spec.id, error = %e, "Skipping extension"),
            }
        }
        loaded
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("ids", &self.initializers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Extensions shipped with kempt.
pub mod builtin {
    use super::*;

    pub const EVENT_LOG: &str = "event-log";
    pub const FINAL_NEWLINE: &str = "final-newline";
    pub const LICENSE_HEADER: &str = "license-header";

    /// Logs every event at debug level.
    pub fn event_log(ctx: &mut ExtensionContext<'_>) -> Result<(), HandlerError> {
        ctx.on("*", |event| {
            match event.file() {
                Some(file) => debug!(event = event.name(), file = %file.display(), "Event"),
                None => debug!(event = event.name(), "Event"),
            }
            Ok(())
        });
        Ok(())
    }

    /// Ensures content ends with a newline before formatting.
    pub fn final_newline(ctx: &mut ExtensionContext<'_>) -> Result<(), HandlerError> {
        ctx.on(names::FORMAT_BEFORE, |event| {
            if let Some(data) = event.file_data_mut() {
                if !data.content.is_empty() && !data.content.ends_with('\n') {
                    data.content.push('\n');
                    data.context.record_modification(FINAL_NEWLINE);
                }
            }
            Ok(())
        });
        Ok(())
    }

    /// Prepends `options.header` when the content does not already start
    /// with it. `options.extensions` optionally limits the file types.
    pub fn license_header(ctx: &mut ExtensionContext<'_>) -> Result<(), HandlerError> {
        let header = ctx
            .option_str("header")
            .filter(|h| !h.trim().is_empty())
            .ok_or("option 'header' is required")?
            .trim_end()
            .to_string();
        let only: Option<Vec<String>> = ctx.options.get("extensions").and_then(Value::as_array).map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim_start_matches('.').to_ascii_lowercase())
                .collect()
        });

        ctx.on(names::FORMAT_BEFORE, move |event| {
            let Some(data) = event.file_data_mut() else {
                return Ok(());
            };
            if let Some(only) = &only {
                if !only.iter().any(|e| *e == data.extension) {
                    return Ok(());
                }
            }
            let present = data.content.trim_start().starts_with(&header);
            data.context.set("license-header.present", Value::Bool(present));
            if !present {
                data.content = format!("{}\n{}", header, data.content);
                data.context.record_modification(LICENSE_HEADER);
            }
            Ok(())
        });
        Ok(())
    }
}
