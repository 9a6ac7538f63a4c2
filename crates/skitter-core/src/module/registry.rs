//! Typed module directory with score-based selection.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::module::{split_mid, update_score, Module, ModuleError, ModuleInstance, Type, MID};

/// Registry of worker modules, keyed by type and MID. Reads (selection) are
/// concurrent; registration and removal take the write lock.
pub struct Registrar {
    module_type_map: RwLock<HashMap<Type, HashMap<MID, ModuleInstance>>>,
}

impl Default for Registrar {
    fn default() -> Self {
        Self::new()
    }
}

impl Registrar {
    pub fn new() -> Self {
        Registrar {
            module_type_map: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a module under the type encoded in its MID. Returns
    /// `Ok(false)` without touching the registry when the MID is already
    /// present.
    pub fn register(&self, instance: ModuleInstance) -> Result<bool, ModuleError> {
        let mid = instance.id().clone();
        let (module_type, _, _) = split_mid(&mid)?;
        if module_type != instance.module_type() {
            return Err(ModuleError::IllegalParameter(format!(
                "incorrect module type: {}",
                module_type
            )));
        }
        let mut map = self.module_type_map.write().unwrap();
        let modules = map.entry(module_type).or_default();
        if modules.contains_key(&mid) {
            return Ok(false);
        }
        modules.insert(mid, instance);
        Ok(true)
    }

    /// Removes the module with the given MID; reports whether anything was
    /// deleted.
    pub fn unregister(&self, mid: &MID) -> Result<bool, ModuleError> {
        let (module_type, _, _) = split_mid(mid)?;
        let mut map = self.module_type_map.write().unwrap();
        if let Some(modules) = map.get_mut(&module_type) {
            return Ok(modules.remove(mid).is_some());
        }
        Ok(false)
    }

    /// Picks the registered module of `module_type` with the lowest score,
    /// recomputing every candidate's score first.
    pub fn get(&self, module_type: Type) -> Result<ModuleInstance, ModuleError> {
        let map = self.module_type_map.read().unwrap();
        let modules = map
            .get(&module_type)
            .filter(|m| !m.is_empty())
            .ok_or(ModuleError::NotFound)?;
        let mut best: Option<(u64, &ModuleInstance)> = None;
        for instance in modules.values() {
            update_score(instance.as_module());
            let score = instance.as_module().score();
            match best {
                Some((min_score, _)) if score >= min_score => {}
                _ => best = Some((score, instance)),
            }
        }
        best.map(|(_, instance)| instance.clone())
            .ok_or(ModuleError::NotFound)
    }

    /// Defensive copy of all modules of one type.
    pub fn get_all_by_type(
        &self,
        module_type: Type,
    ) -> Result<HashMap<MID, ModuleInstance>, ModuleError> {
        let map = self.module_type_map.read().unwrap();
        let modules = map
            .get(&module_type)
            .filter(|m| !m.is_empty())
            .ok_or(ModuleError::NotFound)?;
        Ok(modules.clone())
    }

    /// Defensive copy of every registered module.
    pub fn get_all(&self) -> HashMap<MID, ModuleInstance> {
        let map = self.module_type_map.read().unwrap();
        let mut result = HashMap::new();
        for modules in map.values() {
            for (mid, instance) in modules {
                result.insert(mid.clone(), instance.clone());
            }
        }
        result
    }

    /// Drops every registered module.
    pub fn clear(&self) {
        self.module_type_map.write().unwrap().clear();
    }
}
