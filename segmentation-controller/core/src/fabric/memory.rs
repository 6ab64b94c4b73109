//! An in-memory fabric.
//!
//! Each gateway call takes the state lock once, so calls are atomic with
//! respect to each other just as they are on a real fabric controller.
//! Deleting or unbinding a missing object is a no-op; annotating or binding a
//! missing object fails with [`Error::NotFound`].

use super::{AnnotationScope, Bindings, EpgRef, Error, FabricGateway, ObjectId, Result};
use crate::{sets, Rule};
use parking_lot::Mutex;
use std::{collections::BTreeMap, sync::Arc};

#[derive(Clone, Debug, Default)]
pub struct MemoryFabric {
    state: Arc<Mutex<State>>,
}

/// A snapshot of an endpoint group.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Epg {
    pub description: String,
    pub bridge_domain: String,
    pub vmm_domain: String,
    /// `<app profile>/<epg>` of the master this group inherits from.
    pub masters: Vec<String>,
    pub annotations: BTreeMap<String, String>,
    pub bindings: Bindings,
}

/// A snapshot of a filter and its single entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Filter {
    pub rule: Rule,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct State {
    tenants: BTreeMap<String, String>,
    app_profiles: BTreeMap<(String, String), String>,
    epgs: BTreeMap<EpgRef, Epg>,
    filters: BTreeMap<(String, String), Filter>,
    contracts: BTreeMap<(String, String), Vec<String>>,
    mutations: u64,
}

// === impl MemoryFabric ===

impl MemoryFabric {
    pub fn epg(&self, epg: &EpgRef) -> Option<Epg> {
        self.state.lock().epgs.get(epg).cloned()
    }

    /// Lists the endpoint groups of every application profile in `tenant`.
    pub fn epgs(&self, tenant: &str) -> Vec<EpgRef> {
        self.state
            .lock()
            .epgs
            .keys()
            .filter(|epg| epg.tenant == tenant)
            .cloned()
            .collect()
    }

    pub fn filter(&self, tenant: &str, name: &str) -> Option<Filter> {
        self.state
            .lock()
            .filters
            .get(&key(tenant, name))
            .cloned()
    }

    pub fn filters(&self, tenant: &str) -> Vec<String> {
        self.state
            .lock()
            .filters
            .keys()
            .filter(|(t, _)| t == tenant)
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Returns the filters associated with the contract's subject, or `None`
    /// if the contract does not exist.
    pub fn contract_filters(&self, tenant: &str, name: &str) -> Option<Vec<String>> {
        self.state
            .lock()
            .contracts
            .get(&key(tenant, name))
            .cloned()
    }

    pub fn tenants(&self) -> Vec<String> {
        self.state.lock().tenants.keys().cloned().collect()
    }

    /// Counts every mutating call made against the fabric, whether or not it
    /// changed anything.
    pub fn mutations(&self) -> u64 {
        self.state.lock().mutations
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.state.lock();
        state.mutations += 1;
        f(&mut state)
    }

    fn with_epg<T>(&self, epg: &EpgRef, f: impl FnOnce(&mut Epg) -> T) -> Result<T> {
        self.mutate(|state| {
            state
                .epgs
                .get_mut(epg)
                .map(f)
                .ok_or_else(|| Error::NotFound(epg.to_string()))
        })
    }

    fn annotations_mut<'s>(
        state: &'s mut State,
        object: &ObjectId,
    ) -> Result<&'s mut BTreeMap<String, String>> {
        let annotations = match object {
            ObjectId::Epg(epg) => state.epgs.get_mut(epg).map(|e| &mut e.annotations),
            ObjectId::Filter { tenant, name } => state
                .filters
                .get_mut(&key(tenant, name))
                .map(|f| &mut f.annotations),
        };
        annotations.ok_or_else(|| Error::NotFound(object.to_string()))
    }
}

fn key(tenant: &str, name: &str) -> (String, String) {
    (tenant.to_string(), name.to_string())
}

#[async_trait::async_trait]
impl FabricGateway for MemoryFabric {
    async fn create_tenant(&self, name: &str, description: &str) -> Result<()> {
        self.mutate(|state| {
            state
                .tenants
                .insert(name.to_string(), description.to_string());
        });
        Ok(())
    }

    async fn delete_tenant(&self, name: &str) -> Result<()> {
        self.mutate(|state| {
            state.tenants.remove(name);
            state.app_profiles.retain(|(t, _), _| t != name);
            state.epgs.retain(|epg, _| epg.tenant != name);
            state.filters.retain(|(t, _), _| t != name);
            state.contracts.retain(|(t, _), _| t != name);
        });
        Ok(())
    }

    async fn create_application_profile(
        &self,
        tenant: &str,
        name: &str,
        description: &str,
    ) -> Result<()> {
        self.mutate(|state| {
            state
                .app_profiles
                .insert(key(tenant, name), description.to_string());
        });
        Ok(())
    }

    async fn delete_application_profile(&self, tenant: &str, name: &str) -> Result<()> {
        self.mutate(|state| {
            state.app_profiles.remove(&key(tenant, name));
            state
                .epgs
                .retain(|epg, _| !(epg.tenant == tenant && epg.app_profile == name));
        });
        Ok(())
    }

    async fn application_profile_exists(&self, tenant: &str, name: &str) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .app_profiles
            .contains_key(&key(tenant, name)))
    }

    async fn application_profile_is_empty(&self, tenant: &str, name: &str) -> Result<bool> {
        Ok(!self
            .state
            .lock()
            .epgs
            .keys()
            .any(|epg| epg.tenant == tenant && epg.app_profile == name))
    }

    async fn create_epg(
        &self,
        epg: &EpgRef,
        description: &str,
        bridge_domain: &str,
        vmm_domain: &str,
    ) -> Result<()> {
        self.mutate(|state| {
            if !state
                .app_profiles
                .contains_key(&key(&epg.tenant, &epg.app_profile))
            {
                return Err(Error::NotFound(format!(
                    "uni/tn-{}/ap-{}",
                    epg.tenant, epg.app_profile
                )));
            }
            let e = state.epgs.entry(epg.clone()).or_default();
            e.description = description.to_string();
            e.bridge_domain = bridge_domain.to_string();
            e.vmm_domain = vmm_domain.to_string();
            Ok(())
        })
    }

    async fn delete_epg(&self, epg: &EpgRef) -> Result<()> {
        self.mutate(|state| {
            state.epgs.remove(epg);
        });
        Ok(())
    }

    async fn epg_exists(&self, epg: &EpgRef) -> Result<bool> {
        Ok(self.state.lock().epgs.contains_key(epg))
    }

    async fn inherit_from_master(
        &self,
        epg: &EpgRef,
        master_app_profile: &str,
        master_epg: &str,
    ) -> Result<()> {
        let master = format!("{master_app_profile}/{master_epg}");
        self.with_epg(epg, |e| {
            if !e.masters.contains(&master) {
                e.masters.push(master);
            }
        })
    }

    async fn add_annotation(&self, object: &ObjectId, key: &str, value: &str) -> Result<()> {
        self.mutate(|state| {
            Self::annotations_mut(state, object)?.insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    async fn remove_annotation(&self, object: &ObjectId, key: &str) -> Result<()> {
        self.mutate(|state| {
            if let Ok(annotations) = Self::annotations_mut(state, object) {
                annotations.remove(key);
            }
        });
        Ok(())
    }

    async fn list_annotations(&self, object: &ObjectId) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        let annotations = Self::annotations_mut(&mut state, object)?;
        Ok(annotations.keys().cloned().collect())
    }

    async fn list_objects_with_annotation(
        &self,
        scope: &AnnotationScope,
        key: &str,
    ) -> Result<Vec<String>> {
        let state = self.state.lock();
        let names = match scope {
            AnnotationScope::Epgs {
                tenant,
                app_profile,
            } => state
                .epgs
                .iter()
                .filter(|(epg, e)| {
                    epg.tenant == *tenant
                        && epg.app_profile == *app_profile
                        && e.annotations.contains_key(key)
                })
                .map(|(epg, _)| epg.name.clone())
                .collect(),
            AnnotationScope::Filters { tenant } => state
                .filters
                .iter()
                .filter(|((t, _), f)| t == tenant && f.annotations.contains_key(key))
                .map(|((_, name), _)| name.clone())
                .collect(),
        };
        Ok(names)
    }

    async fn create_contract(&self, tenant: &str, name: &str, filters: &[String]) -> Result<()> {
        self.mutate(|state| {
            let subject = state.contracts.entry(key(tenant, name)).or_default();
            for filter in filters {
                if !sets::contains(subject, filter) {
                    subject.push(filter.clone());
                }
            }
        });
        Ok(())
    }

    async fn delete_contract(&self, tenant: &str, name: &str) -> Result<()> {
        self.mutate(|state| {
            state.contracts.remove(&key(tenant, name));
        });
        Ok(())
    }

    async fn contract_exists(&self, tenant: &str, name: &str) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .contracts
            .contains_key(&key(tenant, name)))
    }

    async fn subject_filters(&self, tenant: &str, name: &str) -> Result<Vec<String>> {
        self.state
            .lock()
            .contracts
            .get(&key(tenant, name))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("uni/tn-{tenant}/brc-{name}")))
    }

    async fn remove_filter_from_subject(
        &self,
        tenant: &str,
        name: &str,
        filter: &str,
    ) -> Result<()> {
        self.mutate(|state| {
            if let Some(subject) = state.contracts.get_mut(&key(tenant, name)) {
                sets::remove(subject, filter);
            }
        });
        Ok(())
    }

    async fn consume(&self, epg: &EpgRef, contract: &str) -> Result<()> {
        self.with_epg(epg, |e| {
            if !sets::contains(&e.bindings.consumed, contract) {
                e.bindings.consumed.push(contract.to_string());
            }
        })
    }

    async fn provide(&self, epg: &EpgRef, contract: &str) -> Result<()> {
        self.with_epg(epg, |e| {
            if !sets::contains(&e.bindings.provided, contract) {
                e.bindings.provided.push(contract.to_string());
            }
        })
    }

    async fn remove_consume(&self, epg: &EpgRef, contract: &str) -> Result<()> {
        self.mutate(|state| {
            if let Some(e) = state.epgs.get_mut(epg) {
                sets::remove(&mut e.bindings.consumed, contract);
            }
        });
        Ok(())
    }

    async fn remove_provide(&self, epg: &EpgRef, contract: &str) -> Result<()> {
        self.mutate(|state| {
            if let Some(e) = state.epgs.get_mut(epg) {
                sets::remove(&mut e.bindings.provided, contract);
            }
        });
        Ok(())
    }

    async fn bindings(&self, epg: &EpgRef) -> Result<Bindings> {
        self.state
            .lock()
            .epgs
            .get(epg)
            .map(|e| e.bindings.clone())
            .ok_or_else(|| Error::NotFound(epg.to_string()))
    }

    async fn create_filter(&self, tenant: &str, name: &str, rule: &Rule) -> Result<()> {
        self.mutate(|state| {
            state.filters.entry(key(tenant, name)).or_default().rule = rule.clone();
        });
        Ok(())
    }

    async fn delete_filter(&self, tenant: &str, name: &str) -> Result<()> {
        self.mutate(|state| {
            state.filters.remove(&key(tenant, name));
        });
        Ok(())
    }

    async fn filter_exists(&self, tenant: &str, name: &str) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .filters
            .contains_key(&key(tenant, name)))
    }
}
