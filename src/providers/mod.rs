//! Upstream adapters and the registry that picks one per feed.
//!
//! Each adapter knows exactly one upstream shape and maps it into the
//! version-agnostic entity model. Static content (system information,
//! pricing plans, alerts) usually comes from the feed config, so those
//! methods have default implementations.

pub mod example;
pub mod fleetster;
pub mod free2move;
pub mod lastenvelo;

use anyhow::{Result, bail};
use async_trait::async_trait;

use crate::config::FeedConfig;
use crate::model::{Fleet, Record};

#[async_trait]
pub trait Provider: Send {
    fn feed_config(&self) -> &FeedConfig;

    fn load_system_information(&self) -> Record {
        self.feed_config().feed_data.system_information.clone()
    }

    fn load_pricing_plans(&self) -> Option<Vec<Record>> {
        self.feed_config().feed_data.pricing_plans.clone()
    }

    fn load_alerts(&self) -> Option<Vec<Record>> {
        self.feed_config().feed_data.alerts.clone()
    }

    /// Stations, station status, vehicle types and vehicles, each keyed by id.
    ///
    /// `default_last_reported` is the run's timestamp for entities the
    /// upstream does not timestamp itself.
    async fn load_stations_and_vehicles(&mut self, default_last_reported: i64) -> Result<Fleet>;

    async fn load_geofencing_zones(&mut self) -> Result<Option<Vec<Record>>> {
        Ok(None)
    }
}

type Constructor = fn(FeedConfig) -> Result<Box<dyn Provider>>;

enum Matcher {
    Exact(&'static str),
    Prefix(&'static str),
}

impl Matcher {
    fn matches(&self, id: &str) -> bool {
        match self {
            Matcher::Exact(name) => id == *name,
            Matcher::Prefix(prefix) => id.starts_with(prefix),
        }
    }
}

/// Adapters by operator identifier, first match wins.
const REGISTRY: &[(Matcher, Constructor)] = &[
    (Matcher::Exact("example"), example::build),
    (Matcher::Exact("lastenvelo_fr"), lastenvelo::build),
    (Matcher::Exact("deer"), fleetster::build_deer),
    (Matcher::Prefix("free2move_"), free2move::build),
];

fn lookup(id: &str) -> Option<Constructor> {
    REGISTRY
        .iter()
        .find(|(matcher, _)| matcher.matches(id))
        .map(|(_, constructor)| *constructor)
}

/// Builds the adapter for feed `id`.
///
/// `generator.provider` in the feed config takes precedence over the feed
/// id, so several feeds can share one adapter.
pub fn build_provider(id: &str, config: FeedConfig) -> Result<Box<dyn Provider>> {
    let adapter_id = config.generator.provider.as_deref().unwrap_or(id);
    match lookup(adapter_id) {
        Some(constructor) => constructor(config),
        None => bail!("Unknown provider {adapter_id}"),
    }
}
