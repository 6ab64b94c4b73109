use super::Reconciler;
use crate::{
    fabric::{self, AnnotationScope, FabricGateway, ObjectId},
    naming, sets, Rule,
};
use tracing::debug;

impl<G: FabricGateway> Reconciler<G> {
    /// Makes the policy's contract subject reference exactly one filter per
    /// rule and removes the filters of rules that were dropped.
    ///
    /// The subject is updated before any filter is deleted so that a filter is
    /// never deleted while still attached.
    pub(super) async fn converge_contract(
        &self,
        policy: &str,
        tenant: &str,
        rules: &[Rule],
    ) -> fabric::Result<()> {
        let contract = naming::contract(policy);
        let desired = sets::dedup(rules.iter().map(|rule| naming::filter(policy, rule)));

        let exists = self.gateway.contract_exists(tenant, contract).await?;
        let associated = if exists {
            self.gateway.subject_filters(tenant, contract).await?
        } else {
            Vec::new()
        };
        if !exists || !sets::unique(&associated, &desired).is_empty() {
            self.gateway
                .create_contract(tenant, contract, &desired)
                .await?;
            debug!(%contract, filters = desired.len(), "Updated contract");
        }
        for filter in sets::unique(&desired, &associated) {
            fabric::ignore_not_found(
                self.gateway
                    .remove_filter_from_subject(tenant, contract, &filter)
                    .await,
            )?;
            debug!(%contract, %filter, "Detached filter");
        }

        for rule in rules {
            let name = naming::filter(policy, rule);
            let object = ObjectId::filter(tenant, &name);
            if !self.gateway.filter_exists(tenant, &name).await? {
                self.gateway.create_filter(tenant, &name, rule).await?;
                self.gateway.add_annotation(&object, policy, policy).await?;
                debug!(filter = %name, "Created filter");
            } else if !sets::contains(&self.gateway.list_annotations(&object).await?, policy) {
                self.gateway.add_annotation(&object, policy, policy).await?;
            }
        }

        let scope = AnnotationScope::Filters {
            tenant: tenant.to_string(),
        };
        let owned = self.annotated(&scope, policy).await?;
        for filter in sets::unique(&desired, &owned) {
            fabric::ignore_not_found(self.gateway.delete_filter(tenant, &filter).await)?;
            debug!(%filter, "Deleted filter");
        }

        Ok(())
    }
}
