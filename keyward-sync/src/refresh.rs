//! Read path: refresh declared state from the remote, and import.

use crate::drift::DriftNotice;
use crate::error::{KeyResult, Operation};
use crate::reconciler::{guarded, Reconciler};
use keyward_model::{Family, ManagedKeyBlock, Snapshot};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Result of [`Reconciler::read_all`] and [`Reconciler::import`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadOutcome {
    /// Refreshed blocks per requested family, ordered by name.
    pub blocks: BTreeMap<Family, Vec<ManagedKeyBlock>>,
    /// Entries whose version token moved since the last read.
    pub drift: Vec<DriftNotice>,
    /// Entries expected to exist that the remote no longer has.
    pub missing: Vec<(Family, String)>,
}

impl ReadOutcome {
    /// Collects the refreshed blocks into a snapshot.
    pub fn into_snapshot(self) -> KeyResult<Snapshot> {
        Ok(Snapshot::from_blocks(self.blocks.into_values().flatten())?)
    }
}

impl Reconciler {
    /// Re-reads every entry `last_declared` holds for `families`.
    ///
    /// Echoed fields come from the remote; redacted fields are carried over
    /// from `last_declared` since the remote never returns them. Entries the
    /// remote reports absent are dropped. Families without declared entries
    /// issue no remote calls and map to an empty list.
    pub async fn read_all(
        &self,
        families: &[Family],
        last_declared: &Snapshot,
        cancel: &CancellationToken,
    ) -> KeyResult<ReadOutcome> {
        let mut outcome = ReadOutcome::default();

        for &family in families {
            let schema = self.registry.lookup(family)?;
            let mut blocks = Vec::new();

            for declared in last_declared.family(family) {
                let record = match guarded(
                    cancel,
                    family,
                    Operation::Get,
                    self.store.get(family, &declared.name),
                )
                .await
                {
                    Ok(record) => record,
                    Err(e) if e.is_not_found() => {
                        info!("{} managed key {} no longer exists remotely", family, declared.name);
                        self.ledger.write().await.forget(family, &declared.name);
                        outcome.missing.push((family, declared.name.clone()));
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                let notice = {
                    let mut ledger = self.ledger.write().await;
                    self.drift.observe(&mut ledger, &record)
                };
                outcome.drift.extend(notice);

                blocks.push(ManagedKeyBlock {
                    family,
                    name: declared.name.clone(),
                    fields: schema.merge_remote(&record.fields, Some(&declared.fields)),
                });
            }

            debug!("Refreshed {} {} managed keys", blocks.len(), family);
            outcome.blocks.insert(family, blocks);
        }

        Ok(outcome)
    }

    /// Adopts every remote entry of `families`.
    ///
    /// Imported blocks carry no redacted fields; the caller must supply them
    /// before the next apply. Each read goes through the drift reporter, so a
    /// tracked key changed out of band is reported here too. Imported names
    /// are marked owned. Names listed but gone by the time they are read end
    /// up in `missing`.
    pub async fn import(
        &self,
        families: &[Family],
        cancel: &CancellationToken,
    ) -> KeyResult<ReadOutcome> {
        let mut outcome = ReadOutcome::default();

        for &family in families {
            let schema = self.registry.lookup(family)?;
            let names = guarded(cancel, family, Operation::List, self.store.list(family)).await?;

            let mut blocks = Vec::new();
            for name in names {
                let record = match guarded(
                    cancel,
                    family,
                    Operation::Get,
                    self.store.get(family, &name),
                )
                .await
                {
                    Ok(record) => record,
                    Err(e) if e.is_not_found() => {
                        debug!("{} managed key {} vanished during import", family, name);
                        outcome.missing.push((family, name));
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                let notice = {
                    let mut ledger = self.ledger.write().await;
                    ledger.mark_owned(family, &name);
                    self.drift.observe(&mut ledger, &record)
                };
                outcome.drift.extend(notice);

                blocks.push(ManagedKeyBlock {
                    family,
                    fields: schema.merge_remote(&record.fields, None),
                    name,
                });
            }

            info!("Imported {} {} managed keys", blocks.len(), family);
            outcome.blocks.insert(family, blocks);
        }

        Ok(outcome)
    }
}
