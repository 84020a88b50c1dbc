//! The parameter processor: tuples in, canonical option map out.
//!
//! Pipeline per request:
//!
//! 1. expand derivative presets into `Derivative`-source tuples;
//! 2. group tuples by canonical name, keeping the highest priority
//!    (discards are retained for the debug surface);
//! 3. validate retained tuples against the registry, substituting registered
//!    defaults on failure;
//! 4. run the strategy registry (size codes, aspect, overlays, legacy
//!    dimensions);
//! 5. apply registry formatters and emit [`ResolvedOptions`].
//!
//! Failure is always local: malformed values drop with a warning, and an
//! empty option map is a valid outcome (the transform then just fetches the
//! original).

pub mod strategies;

pub use strategies::{ParamStrategy, builtin_strategies};

use crate::parsers::ParseYield;
use refract_kernel::config::TransformSettings;
use refract_kernel::params::{
    OptionValue, ParamSource, ResolvedOptions, TransformOption, lookup,
};
use std::collections::HashMap;
use tracing::{debug, warn};

pub struct ParamProcessor {
    strategies: Vec<Box<dyn ParamStrategy>>,
    /// Named presets from configuration: derivative → option name → value.
    derivatives: HashMap<String, HashMap<String, serde_json::Value>>,
}

impl ParamProcessor {
    /// Assemble the processor with the built-in strategy set and the
    /// configured derivative presets.
    pub fn new(transform: &TransformSettings) -> Self {
        Self {
            strategies: builtin_strategies(),
            derivatives: transform.derivatives.clone(),
        }
    }

    /// Register an additional strategy. Consulted after the built-ins.
    pub fn with_strategy(mut self, strategy: Box<dyn ParamStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Reconcile parsed tuples into the canonical option map.
    pub fn process(&self, parsed: ParseYield) -> ResolvedOptions {
        let ParseYield {
            mut options,
            conditionals,
        } = parsed;

        self.expand_derivatives(&mut options);

        let mut out = ResolvedOptions::default();
        out.conditionals = conditionals;

        // ── Group by canonical name, highest priority wins ───────────────────
        let mut winners: Vec<TransformOption> = Vec::with_capacity(options.len());
        let mut index: HashMap<String, usize> = HashMap::with_capacity(options.len());
        for opt in options {
            match index.get(&opt.name) {
                Some(&i) if winners[i].priority >= opt.priority => {
                    debug!(
                        param = opt.name.as_str(),
                        source = %opt.source,
                        "discarding lower-priority duplicate"
                    );
                    out.discarded.push(opt);
                }
                Some(&i) => {
                    let loser = std::mem::replace(&mut winners[i], opt);
                    out.discarded.push(loser);
                }
                None => {
                    index.insert(opt.name.clone(), winners.len());
                    winners.push(opt);
                }
            }
        }

        // ── Validate, with default substitution ──────────────────────────────
        let mut retained: Vec<TransformOption> = Vec::with_capacity(winners.len());
        for mut opt in winners {
            let Some(def) = lookup(&opt.name) else {
                // Unknown passthrough name: no entry to validate against.
                retained.push(opt);
                continue;
            };
            if let Err(err) = def.validate(&opt.value) {
                match def.default_value() {
                    Some(default) => {
                        warn!(param = def.name, %err, "substituting registered default");
                        opt.value = default;
                        opt.source = ParamSource::Derived;
                        retained.push(opt);
                    }
                    None => {
                        warn!(param = def.name, %err, "dropping invalid parameter");
                        out.discarded.push(opt);
                    }
                }
                continue;
            }
            retained.push(opt);
        }

        // ── Strategies, then formatters ──────────────────────────────────────
        // Higher-priority tuples land first so strategies can observe
        // explicit values that outrank them.
        retained.sort_by(|a, b| b.priority.cmp(&a.priority));

        for opt in retained {
            if let Some(strategy) = self.strategies.iter().find(|s| s.can_process(&opt)) {
                let name = opt.name.clone();
                if let Err(err) = strategy.process(opt, &mut out) {
                    warn!(param = name.as_str(), strategy = strategy.name(), %err, "strategy discarded tuple");
                }
                continue;
            }

            let explicit = !matches!(opt.source, ParamSource::Derived);
            if opt.name == "width" && explicit {
                out.explicit_width = true;
            }
            if opt.name == "height" && explicit {
                out.explicit_height = true;
            }

            match lookup(&opt.name) {
                Some(def) => out.map.insert(def.name, def.format(opt.value)),
                None => out.map.insert(opt.name, opt.value),
            }
        }

        // Context-aware aspect cropping needs intrinsic dimensions, as do
        // pending conditionals.
        out.needs_image_info = !out.conditionals.is_empty()
            || (out.map.boolean("ctx").unwrap_or(false) && out.map.contains("aspect"));

        out
    }

    /// Replace `derivative` tuples' presets with Derivative-source tuples.
    /// The `derivative` name itself stays in the stream so the cache
    /// controller can tag by preset.
    fn expand_derivatives(&self, options: &mut Vec<TransformOption>) {
        let Some(requested) = options
            .iter()
            .filter(|o| o.name == "derivative")
            .max_by_key(|o| o.priority)
            .and_then(|o| o.value.as_str())
            .map(str::to_string)
        else {
            return;
        };

        let Some(preset) = self.derivatives.get(&requested) else {
            warn!(derivative = requested.as_str(), "unknown derivative preset");
            return;
        };

        for (name, raw) in preset {
            let Some(def) = lookup(name) else {
                warn!(
                    derivative = requested.as_str(),
                    param = name.as_str(),
                    "derivative preset names an unknown parameter"
                );
                continue;
            };
            let value = match raw {
                serde_json::Value::Number(n) => n.as_f64().map(OptionValue::Number),
                serde_json::Value::Bool(b) => Some(OptionValue::Bool(*b)),
                serde_json::Value::String(s) => def.parse_value(s).ok(),
                _ => None,
            };
            match value {
                Some(value) => options.push(
                    TransformOption::new(def.name, value, ParamSource::Derivative)
                        .with_priority(ParamSource::Derivative.base_priority() + def.priority),
                ),
                None => warn!(
                    derivative = requested.as_str(),
                    param = name.as_str(),
                    "derivative preset value is unusable"
                ),
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
