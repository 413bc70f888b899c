//! Alias switching.
//!
//! Moves a stable alias onto a freshly built index in one atomic alias batch,
//! so readers never see the alias missing or bound to both generations. Other
//! aliases carried by the previous index move along in the same batch. Old
//! indices are deleted afterwards; a failed delete leaves an orphan behind but
//! never undoes the switch.

use std::collections::BTreeSet;
use std::sync::Arc;

use reindexer_repository::{AliasAction, SearchEngineProvider};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::errors::ReindexError;

/// What a switch did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SwitchReport {
    pub alias: String,
    pub new_index: String,
    /// Indices the alias pointed at before the switch.
    pub previous: Vec<String>,
    /// Other aliases moved from a previous index onto the new one.
    pub migrated_aliases: Vec<String>,
    /// Previous indices that could not be deleted.
    pub orphaned: Vec<String>,
}

pub struct AliasSwitcher {
    engine: Arc<dyn SearchEngineProvider>,
}

impl AliasSwitcher {
    pub fn new(engine: Arc<dyn SearchEngineProvider>) -> Self {
        Self { engine }
    }

    /// Point `alias` at `new_index` and drop the indices it used to target.
    ///
    /// Fails only when the lookups or the alias batch fail; in that case the
    /// alias is untouched.
    #[instrument(skip(self))]
    pub async fn switch_alias(
        &self,
        new_index: &str,
        alias: &str,
    ) -> Result<SwitchReport, ReindexError> {
        let previous: Vec<String> = self
            .engine
            .indices_for_alias(alias)
            .await?
            .into_iter()
            .filter(|index| index != new_index)
            .collect();

        if previous.len() > 1 {
            warn!(alias = %alias, indices = ?previous, "Alias was bound to several indices");
        }

        let mut removes = Vec::new();
        let mut adds = Vec::new();
        let mut migrated = BTreeSet::new();

        for old in &previous {
            removes.push(AliasAction::remove(old, alias));
            for other in self.engine.aliases_for_index(old).await? {
                if other == alias {
                    continue;
                }
                removes.push(AliasAction::remove(old, &other));
                if migrated.insert(other.clone()) {
                    adds.push(AliasAction::add(new_index, &other));
                }
            }
        }
        adds.push(AliasAction::add(new_index, alias));

        let mut actions = removes;
        actions.extend(adds);
        self.engine.update_aliases(&actions).await?;

        info!(
            alias = %alias,
            new_index = %new_index,
            previous = ?previous,
            migrated = ?migrated,
            "Alias switched"
        );

        let mut orphaned = Vec::new();
        for old in &previous {
            if let Err(e) = self.engine.delete_index(old).await {
                warn!(index = %old, alias = %alias, error = %e, "Orphan index: delete after switch failed");
                orphaned.push(old.clone());
            }
        }

        Ok(SwitchReport {
            alias: alias.to_string(),
            new_index: new_index.to_string(),
            previous,
            migrated_aliases: migrated.into_iter().collect(),
            orphaned,
        })
    }
}
