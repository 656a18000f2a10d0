//! Binding registry: registration and lookup of device initializers.
//!
//! Responsibilities:
//! - Map compatibility strings and instance names to [Binding]s, and keep
//!   the table of force bindings that run once per machine pass.
//! - Preserve registration order: tables are append-only and a key lookup
//!   always yields the first binding registered under that key, so start-up
//!   registration order fully determines dispatch behavior.
//! - Allow concurrent lookups once registration has finished; a registry in
//!   a `static` is built with the `const` constructor and filled during
//!   process setup.

use crate::{
    binding::{BindOpaque, Binding, InitFn, InitResult},
    machine::FdtMachine,
};
use alloc::{boxed::Box, collections::btree_map::BTreeMap, sync::Arc, vec::Vec};
use log::{debug, info};
use spin::RwLock;

type BindingMap = BTreeMap<Box<str>, Vec<Arc<Binding>>>;

pub struct BindingRegistry {
    compat_map: RwLock<BindingMap>,
    inst_map: RwLock<BindingMap>,
    force_tab: RwLock<Vec<Arc<Binding>>>,
}

impl BindingRegistry {
    pub const fn new() -> BindingRegistry {
        BindingRegistry {
            compat_map: RwLock::new(BTreeMap::new()),
            inst_map: RwLock::new(BTreeMap::new()),
            force_tab: RwLock::new(Vec::new()),
        }
    }

    // region: registration

    /// Register an initializer for a compatibility string.
    pub fn register_compat<F>(&self, key: &str, init: F)
    where
        F: Fn(&str, &FdtMachine, Option<&BindOpaque>) -> InitResult + Send + Sync + 'static,
    {
        self.register_compat_opaque_inner(key, Box::new(init), None);
    }

    /// Register an initializer for a compatibility string together with a
    /// payload handed back on every invocation.
    pub fn register_compat_opaque<F>(&self, key: &str, init: F, opaque: BindOpaque)
    where
        F: Fn(&str, &FdtMachine, Option<&BindOpaque>) -> InitResult + Send + Sync + 'static,
    {
        self.register_compat_opaque_inner(key, Box::new(init), Some(opaque));
    }

    /// Register one initializer under several compatibility strings.
    pub fn register_compat_list<F>(&self, keys: &[&str], init: F)
    where
        F: Fn(&str, &FdtMachine, Option<&BindOpaque>) -> InitResult + Send + Sync + Clone + 'static,
    {
        for key in keys {
            self.register_compat_opaque_inner(key, Box::new(init.clone()), None);
        }
    }

    /// Register an initializer for an instance name (node name with the unit
    /// address stripped).
    pub fn register_inst<F>(&self, key: &str, init: F)
    where
        F: Fn(&str, &FdtMachine, Option<&BindOpaque>) -> InitResult + Send + Sync + 'static,
    {
        self.register_inst_opaque_inner(key, Box::new(init), None);
    }

    pub fn register_inst_opaque<F>(&self, key: &str, init: F, opaque: BindOpaque)
    where
        F: Fn(&str, &FdtMachine, Option<&BindOpaque>) -> InitResult + Send + Sync + 'static,
    {
        self.register_inst_opaque_inner(key, Box::new(init), Some(opaque));
    }

    /// Register an initializer that runs once per pass regardless of document
    /// content. `label` only identifies the binding in logs and reports.
    pub fn register_force<F>(&self, label: &str, init: F)
    where
        F: Fn(&str, &FdtMachine, Option<&BindOpaque>) -> InitResult + Send + Sync + 'static,
    {
        self.register_force_opaque_inner(label, Box::new(init), None);
    }

    pub fn register_force_opaque<F>(&self, label: &str, init: F, opaque: BindOpaque)
    where
        F: Fn(&str, &FdtMachine, Option<&BindOpaque>) -> InitResult + Send + Sync + 'static,
    {
        self.register_force_opaque_inner(label, Box::new(init), Some(opaque));
    }

    fn register_compat_opaque_inner(&self, key: &str, init: Box<InitFn>, opaque: Option<BindOpaque>) {
        debug!("registered compat binding '{}'", key);
        Self::append(&self.compat_map, key, Binding::new(key, init, opaque));
    }

    fn register_inst_opaque_inner(&self, key: &str, init: Box<InitFn>, opaque: Option<BindOpaque>) {
        debug!("registered instance binding '{}'", key);
        Self::append(&self.inst_map, key, Binding::new(key, init, opaque));
    }

    fn register_force_opaque_inner(&self, label: &str, init: Box<InitFn>, opaque: Option<BindOpaque>) {
        debug!("registered force binding '{}'", label);
        self.force_tab
            .write()
            .push(Binding::new(label, init, opaque));
    }

    fn append(map: &RwLock<BindingMap>, key: &str, binding: Arc<Binding>) {
        let mut guard = map.write();
        guard.entry(Box::from(key)).or_default().push(binding);
    }

    // endregion

    // region: lookup

    /// First binding registered for `compat`, if any.
    pub fn lookup_compat(&self, compat: &str) -> Option<Arc<Binding>> {
        let guard = self.compat_map.read();
        guard.get(compat).and_then(|list| list.first()).cloned()
    }

    /// First binding registered for instance name `name`, if any.
    pub fn lookup_inst(&self, name: &str) -> Option<Arc<Binding>> {
        let guard = self.inst_map.read();
        guard.get(name).and_then(|list| list.first()).cloned()
    }

    /// All force bindings in registration order.
    pub fn force_bindings(&self) -> Vec<Arc<Binding>> {
        self.force_tab.read().clone()
    }

    pub fn compat_keys(&self) -> Vec<Box<str>> {
        self.compat_map.read().keys().cloned().collect()
    }

    pub fn inst_keys(&self) -> Vec<Box<str>> {
        self.inst_map.read().keys().cloned().collect()
    }

    pub fn force_count(&self) -> usize {
        self.force_tab.read().len()
    }

    // endregion

    // region: diagnostics

    pub fn dump_compat_table(&self) {
        let guard = self.compat_map.read();
        info!("compat table: {} key(s)", guard.len());
        for (key, list) in guard.iter() {
            info!("\t'{}': {} binding(s)", key, list.len());
        }
    }

    pub fn dump_inst_table(&self) {
        let guard = self.inst_map.read();
        info!("instance table: {} key(s)", guard.len());
        for (key, list) in guard.iter() {
            info!("\t'{}': {} binding(s)", key, list.len());
        }
    }

    // endregion
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{InitError, InitStatus};
    use alloc::sync::Arc;
    use dtdoc::builder::TreeBuilder;

    fn machine() -> FdtMachine {
        FdtMachine::new(Arc::new(TreeBuilder::new().build()))
    }

    fn done_init(_: &str, _: &FdtMachine, _: Option<&BindOpaque>) -> InitResult {
        Ok(InitStatus::Done)
    }

    fn failing_init(_: &str, _: &FdtMachine, _: Option<&BindOpaque>) -> InitResult {
        Err(InitError::Custom { info: "boom" })
    }

    fn payload_init(_: &str, _: &FdtMachine, opaque: Option<&BindOpaque>) -> InitResult {
        let payload = opaque.ok_or(InitError::Custom {
            info: "payload missing",
        })?;
        let value = payload.downcast_ref::<u32>().ok_or(InitError::Custom {
            info: "payload type",
        })?;
        if *value != 42 {
            return Err(InitError::Custom {
                info: "payload value",
            });
        }
        Ok(InitStatus::Done)
    }

    #[test]
    fn lookup_yields_the_first_registered_binding() {
        let reg = BindingRegistry::new();
        reg.register_compat("ns16550a", done_init);
        reg.register_compat("ns16550a", failing_init);
        let m = machine();
        let binding = reg.lookup_compat("ns16550a").expect("binding");
        let status = binding.invoke("/uart", &m).expect("first binding wins");
        assert_eq!(status, InitStatus::Done);
    }

    #[test]
    fn lookup_misses_are_none() {
        let reg = BindingRegistry::new();
        assert!(reg.lookup_compat("unknown").is_none());
        assert!(reg.lookup_inst("unknown").is_none());
    }

    #[test]
    fn keys_are_listed_in_sorted_order() {
        let reg = BindingRegistry::new();
        reg.register_compat("c", done_init);
        reg.register_compat("a", done_init);
        reg.register_compat("b", done_init);
        let keys = reg.compat_keys();
        let keys: Vec<&str> = keys.iter().map(|k| k.as_ref()).collect();
        assert_eq!(keys, ["a", "b", "c"]);
    }

    #[test]
    fn force_bindings_keep_registration_order() {
        let reg = BindingRegistry::new();
        reg.register_force("first", done_init);
        reg.register_force("second", done_init);
        reg.register_force("third", done_init);
        let bindings = reg.force_bindings();
        let labels: Vec<&str> = bindings.iter().map(|b| b.key.as_ref()).collect();
        assert_eq!(labels, ["first", "second", "third"]);
        assert_eq!(reg.force_count(), 3);
    }

    #[test]
    fn compat_list_registers_every_key() {
        let reg = BindingRegistry::new();
        reg.register_compat_list(&["vendor,uart-v2", "ns16550a"], done_init);
        let binding = reg.lookup_compat("vendor,uart-v2").expect("first key");
        assert_eq!(binding.key.as_ref(), "vendor,uart-v2");
        let binding = reg.lookup_compat("ns16550a").expect("second key");
        assert_eq!(binding.key.as_ref(), "ns16550a");
    }

    #[test]
    fn binding_opaque_is_handed_back() {
        let reg = BindingRegistry::new();
        reg.register_compat_opaque("with-payload", payload_init, Arc::new(42u32));
        let m = machine();
        let binding = reg.lookup_compat("with-payload").expect("binding");
        let status = binding.invoke("/n", &m).expect("invoke");
        assert_eq!(status, InitStatus::Done);
    }
}
