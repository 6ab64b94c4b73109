//! Shared endpoint group bookkeeping.
//!
//! An endpoint group is owned by every policy whose name appears among its
//! annotations, and it consumes and provides exactly those policies'
//! contracts. It is deleted when its last owner releases it.

use super::{mark, unmark, NamespaceMarker, Reconciler};
use crate::{
    fabric::{self, EpgRef, FabricGateway, ObjectId},
    naming, sets,
};
use tracing::{debug, info};

impl<G: FabricGateway> Reconciler<G> {
    /// Ensures `epg` exists, is annotated as owned by `policy`, and binds
    /// `policy`'s contract.
    pub(super) async fn claim_epg(
        &self,
        policy: &str,
        epg: &EpgRef,
        marker: &impl NamespaceMarker,
    ) -> fabric::Result<()> {
        if !self.gateway.epg_exists(epg).await? {
            self.gateway
                .create_epg(
                    epg,
                    "",
                    &self.config.bridge_domain,
                    &self.config.vmm_domain,
                )
                .await?;
            self.gateway
                .inherit_from_master(
                    epg,
                    &self.config.master_app_profile,
                    &self.config.master_epg,
                )
                .await?;
            info!(%epg, "Created endpoint group");
            mark(marker, epg).await;
        }

        let object = ObjectId::from(epg.clone());
        let owners = self.gateway.list_annotations(&object).await?;
        if !sets::contains(&owners, policy) {
            self.gateway.add_annotation(&object, policy, policy).await?;
            debug!(%epg, "Claimed endpoint group");
        }

        let contract = naming::contract(policy);
        let bindings = self.gateway.bindings(epg).await?;
        if !sets::contains(&bindings.consumed, contract) {
            self.gateway.consume(epg, contract).await?;
        }
        if !sets::contains(&bindings.provided, contract) {
            self.gateway.provide(epg, contract).await?;
        }

        Ok(())
    }

    /// Drops `policy`'s claim on `epg`, deleting the group when no other
    /// policy owns it. A group that no longer exists is already released.
    ///
    /// A sibling policy may be releasing the same group concurrently, so after
    /// removing its own annotation a policy re-reads the owners and deletes the
    /// group if none remain. Groups `policy` never owned are left alone.
    pub(super) async fn release_epg(
        &self,
        policy: &str,
        epg: &EpgRef,
        marker: &impl NamespaceMarker,
    ) -> fabric::Result<()> {
        let object = ObjectId::from(epg.clone());
        let Some(owners) = self.owners(&object).await? else {
            return Ok(());
        };
        if !sets::contains(&owners, policy) {
            return Ok(());
        }

        if owners.iter().all(|owner| owner == policy) {
            return self.delete_group(epg, marker).await;
        }

        // Bindings go first so an interrupted release is still found by its
        // annotation on the next pass.
        let contract = naming::contract(policy);
        let bindings = match self.gateway.bindings(epg).await {
            Ok(bindings) => bindings,
            Err(error) if error.is_not_found() => return Ok(()),
            Err(error) => return Err(error),
        };
        if sets::contains(&bindings.consumed, contract) {
            fabric::ignore_not_found(self.gateway.remove_consume(epg, contract).await)?;
        }
        if sets::contains(&bindings.provided, contract) {
            fabric::ignore_not_found(self.gateway.remove_provide(epg, contract).await)?;
        }
        fabric::ignore_not_found(self.gateway.remove_annotation(&object, policy).await)?;
        debug!(%epg, "Released endpoint group");

        match self.owners(&object).await? {
            Some(owners) if owners.is_empty() => self.delete_group(epg, marker).await,
            _ => Ok(()),
        }
    }

    /// Lists the policies annotated on `object`, or `None` if it is gone.
    async fn owners(&self, object: &ObjectId) -> fabric::Result<Option<Vec<String>>> {
        match self.gateway.list_annotations(object).await {
            Ok(owners) => Ok(Some(owners)),
            Err(error) if error.is_not_found() => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn delete_group(
        &self,
        epg: &EpgRef,
        marker: &impl NamespaceMarker,
    ) -> fabric::Result<()> {
        fabric::ignore_not_found(self.gateway.delete_epg(epg).await)?;
        info!(%epg, "Deleted endpoint group");
        unmark(marker, &epg.name).await;
        Ok(())
    }
}
