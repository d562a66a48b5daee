//! 🔄 Normalisers — raw analytics JSON in, one canonical, permission-safe shape out.
//!
//! ```text
//!   raw payload ──▶ shape::coerce ──▶ (most viewed only: label → page → read access?) ──▶ filter::apply
//! ```
//!
//! Two pipelines share one contract, [`ReportNormaliser`]:
//! - [`MostViewedNormaliser`] — page and search-term reports. Rows whose `label`
//!   points at a page the principal cannot read are dropped.
//! - [`VisitsNormaliser`] — visits over a period. Shape and filters only.
//!
//! [`Normaliser`] is the enum that dispatches between them, so callers pick a
//! kind at runtime without boxing anything.
//!
//! ## Knowledge Graph 🧠
//! - Depends on: `shape`, `filter`, `references`, `permissions`
//! - Used by: `lib::run`, the CLI
//! - Every call is independent: no state survives a call, collaborators are shared read-only.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::app_config::AppConfig;
use crate::common::{FilterSpec, NormalisedResult};
use crate::error::Result;
use crate::permissions::Principal;
use crate::references::StandardUrlResolver;

pub(crate) mod most_viewed;
pub(crate) mod visits;

pub use most_viewed::MostViewedNormaliser;
pub use visits::VisitsNormaliser;

/// 📜 Turn one raw report payload into a [`NormalisedResult`].
///
/// `filters` of `None` (or an empty map) means no filtering.
///
/// # Errors
/// [`crate::error::NormaliseError`] when the payload is not JSON or has an
/// unrecognised shape. Bad labels are never an error.
pub trait ReportNormaliser {
    fn normalise_data(&self, raw_payload: &str, filters: Option<&FilterSpec>) -> Result<NormalisedResult>;
}

/// 🏷️ Which pipeline a report goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormaliserKind {
    MostViewed,
    Visits,
}

impl fmt::Display for NormaliserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormaliserKind::MostViewed => f.write_str("most-viewed"),
            NormaliserKind::Visits => f.write_str("visits"),
        }
    }
}

impl FromStr for NormaliserKind {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> anyhow::Result<Self> {
        match raw {
            "most-viewed" | "most_viewed" | "mostViewed" => Ok(NormaliserKind::MostViewed),
            "visits" => Ok(NormaliserKind::Visits),
            honestly_who_knows => anyhow::bail!(
                "💀 Unknown report kind '{honestly_who_knows}'. We know 'most-viewed' and 'visits'. That's the whole menu."
            ),
        }
    }
}

/// 🎭 The many faces of a normaliser. Dispatches to the concrete pipeline.
#[derive(Debug)]
pub enum Normaliser {
    MostViewed(MostViewedNormaliser),
    Visits(VisitsNormaliser),
}

impl Normaliser {
    /// 🏗️ Wire up a normaliser from config: the standard URL resolver anchored
    /// on `wiki.base_url`, and the `[permissions]` rules as the access check.
    pub fn from_config(kind: NormaliserKind, config: &AppConfig, principal: Principal) -> anyhow::Result<Self> {
        Ok(match kind {
            NormaliserKind::MostViewed => Normaliser::MostViewed(MostViewedNormaliser::new(
                Arc::new(StandardUrlResolver::from_config(&config.wiki)?),
                Arc::new(config.permissions.clone()),
                principal,
            )),
            NormaliserKind::Visits => Normaliser::Visits(VisitsNormaliser),
        })
    }

    pub fn kind(&self) -> NormaliserKind {
        match self {
            Normaliser::MostViewed(_) => NormaliserKind::MostViewed,
            Normaliser::Visits(_) => NormaliserKind::Visits,
        }
    }
}

impl ReportNormaliser for Normaliser {
    fn normalise_data(&self, raw_payload: &str, filters: Option<&FilterSpec>) -> Result<NormalisedResult> {
        match self {
            Normaliser::MostViewed(normaliser) => normaliser.normalise_data(raw_payload, filters),
            Normaliser::Visits(normaliser) => normaliser.normalise_data(raw_payload, filters),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! 🧪 Catch `warn!` events so tests can assert on exactly what was logged.

    use std::collections::HashMap;
    use std::fmt;
    use std::sync::{Arc, Mutex};

    use tracing::field::{Field, Visit};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    /// One captured event: field name → rendered value (`message` included).
    pub(crate) type CapturedEvent = HashMap<String, String>;

    #[derive(Clone, Default)]
    pub(crate) struct WarningCatcher(Arc<Mutex<Vec<CapturedEvent>>>);

    impl WarningCatcher {
        pub(crate) fn warnings(&self) -> Vec<CapturedEvent> {
            self.0.lock().expect("💀 warning catcher poisoned").clone()
        }

        /// Run `body` with this catcher installed as the thread's subscriber.
        pub(crate) fn watch<T>(&self, body: impl FnOnce() -> T) -> T {
            let subscriber = tracing_subscriber::registry().with(self.clone());
            tracing::subscriber::with_default(subscriber, body)
        }
    }

    impl<S: Subscriber> Layer<S> for WarningCatcher {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() != Level::WARN {
                return;
            }
            let mut the_fields = FieldGrabber::default();
            event.record(&mut the_fields);
            self.0.lock().expect("💀 warning catcher poisoned").push(the_fields.0);
        }
    }

    #[derive(Default)]
    struct FieldGrabber(CapturedEvent);

    impl Visit for FieldGrabber {
        fn record_str(&mut self, field: &Field, value: &str) {
            self.0.insert(field.name().to_string(), value.to_string());
        }

        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.0.insert(field.name().to_string(), format!("{value:?}"));
        }
    }
}
