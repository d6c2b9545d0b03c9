//! Encapsulated closures to be executed on incoming packets to produce an
//! output using various program-scale services.
//!
//! It provides simple logic for a basic control flow between [`Hook`].
//!
//! This module defines [`Hook`] that encapsulates the closures, and a
//! [`HookRegistry`] to store [`Hook`] and services.

use std::{
    collections::{hash_map::Entry, HashMap},
    sync::{Arc, Mutex},
};

use itertools::Itertools;
use log::{debug, trace};
use uuid::Uuid;

use crate::core::errors::HookError;

use super::{
    flags::HookFlag,
    packet_context::{PacketContext, PacketType},
    state::PacketState,
    typemap::TypeMap,
};

pub struct HookClosure<T: PacketType, U: PacketType>(
    pub Box<dyn Fn(Arc<Mutex<TypeMap>>, &mut PacketContext<T, U>) -> Result<isize, HookError> + Send + Sync>,
);

/// An encapsulated closure, to be executed on a [`PacketContext`] to perform
/// all types of actions. They make most of the actual logic of the program.
///
/// Hooks can depend on the success or failure of another hook by id, and
/// carry [`HookFlag`]s that control failure-chain behavior.
pub struct Hook<T: PacketType + Send, U: PacketType + Send> {
    id: Uuid,
    name: String,
    dependencies: HashMap<Uuid, bool>,
    flags: Vec<HookFlag>,
    exec: HookClosure<T, U>,
}

impl<T: PacketType + Send, U: PacketType + Send> Hook<T, U> {
    pub fn new(name: String, exec: HookClosure<T, U>, flags: Vec<HookFlag>) -> Self {
        Self { id: Uuid::new_v4(), name, dependencies: HashMap::new(), exec, flags }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn add_flag(&mut self, new_flag: HookFlag) {
        self.flags.push(new_flag);
    }

    pub fn flags(&self) -> &Vec<HookFlag> {
        &self.flags
    }

    /// This hook only runs if `hook` previously succeeded.
    pub fn must(&mut self, hook: Uuid) {
        self.dependencies.insert(hook, true);
    }

    /// This hook only runs if `hook` previously failed (or never ran).
    pub fn must_not(&mut self, hook: Uuid) {
        self.dependencies.insert(hook, false);
    }
}

/// A register to store and manage the different [`Hook`] to be executed on
/// the packets. It also stores various services instances which can then be
/// called by the [`Hook`] to perform logic at the program scale.
pub struct HookRegistry<T: PacketType + Send, U: PacketType + Send> {
    registry: HashMap<PacketState, HashMap<Uuid, Hook<T, U>>>,
    services: Arc<Mutex<TypeMap>>,
    exec_order: HashMap<PacketState, Vec<Uuid>>,
}

impl<T: PacketType + Send, U: PacketType + Send> Default for HookRegistry<T, U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PacketType + Send, U: PacketType + Send> HookRegistry<T, U> {
    pub fn new() -> Self {
        Self { registry: HashMap::new(), services: Arc::new(Mutex::new(TypeMap::new())), exec_order: HashMap::new() }
    }

    /// Execute every registered [`Hook`] on the given [`PacketContext`] for
    /// its current state.
    pub fn run_hooks(&self, packet: &mut PacketContext<T, U>) -> Result<(), HookError> {
        if packet.state() == PacketState::Failure {
            return self.run_failure_chain(packet);
        }

        let exec_order = match self.exec_order.get(&packet.state()) {
            Some(order) => order,
            None => return Ok(()),
        };

        let mut exec_code: HashMap<Uuid, isize> = HashMap::new();

        for hook_id in exec_order.iter() {
            let hook = match self.registry.get(&packet.state()).and_then(|lst| lst.get(hook_id)) {
                Some(hook) => hook,
                None => continue,
            };

            if exec_code.contains_key(&hook.id) {
                continue;
            }

            if !self.can_execute(&exec_code, &hook.dependencies) {
                trace!("Skipped execution of hook {} because of unmet requirements", hook.name);
                continue;
            }

            match (hook.exec.0)(self.services.clone(), packet) {
                Ok(code) => {
                    exec_code.insert(hook.id, code);
                    trace!("Hook {} exited successfully (exit code {})", hook.name, code);
                }
                Err(_) => {
                    if hook.flags.contains(&HookFlag::Fatal) {
                        return self.run_failure_chain(packet);
                    }
                    exec_code.insert(hook.id, -1);
                    debug!("Hook {} exited with failure (exit code -1)", hook.name);
                }
            }
        }
        Ok(())
    }

    /// Insert a new [`Hook`] inside the [`HookRegistry`] for a given
    /// [`PacketState`], recomputing that state's execution order.
    pub fn register_hook(&mut self, state: PacketState, hook: Hook<T, U>) {
        if let Entry::Vacant(e) = self.registry.entry(state) {
            e.insert(HashMap::new());
        }
        self.registry.get_mut(&state).unwrap().insert(hook.id(), hook);

        if let Ok(order) = self.generate_exec_order(&state) {
            self.exec_order.insert(state, order);
        }
    }

    /// Insert a new service inside the [`HookRegistry`]. The service's type
    /// must implement [`Send`] and [`Sync`].
    pub fn register_service<V: Send + Sync + 'static>(&mut self, service: V) {
        self.services.lock().expect("services mutex was poisoned").insert(service);
    }

    pub fn services(&self) -> Arc<Mutex<TypeMap>> {
        self.services.clone()
    }

    fn run_failure_chain(&self, packet: &mut PacketContext<T, U>) -> Result<(), HookError> {
        let Some(failures) = self.registry.get(&PacketState::Failure) else {
            return Err(HookError::new("no failure hooks defined"));
        };
        for hook in failures.values() {
            if let Err(e) = (hook.exec.0)(self.services.clone(), packet) {
                debug!("Hook {} in failure chain exited with failure ({})", hook.name, e);
            }
        }
        Err(HookError::new("one or more fatal hooks was unsuccessful"))
    }

    fn can_execute(&self, exec_code: &HashMap<Uuid, isize>, dependencies: &HashMap<Uuid, bool>) -> bool {
        !dependencies.iter().any(|(dep_id, need_success)| {
            exec_code
                .get(dep_id)
                .map(|code| (*code < 0 && *need_success) || (*code >= 0 && !*need_success))
                .unwrap_or(false)
        })
    }

    fn generate_exec_order(&self, for_state: &PacketState) -> Result<Vec<Uuid>, HookError> {
        let mut deps_map: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        let mut resolved: Vec<Uuid> = Vec::new();

        for (id, hook) in self
            .registry
            .get(for_state)
            .ok_or_else(|| HookError::new("no hooks associated with this state"))?
            .iter()
        {
            deps_map.insert(*id, hook.dependencies.keys().copied().collect_vec());
        }

        while !deps_map.is_empty() {
            let ready: Vec<Uuid> = deps_map.iter().filter(|(_, deps)| deps.is_empty()).map(|(id, _)| *id).collect();

            if ready.is_empty() {
                return Err(HookError::new("circular dependencies in hooks"));
            }

            for id in ready.iter() {
                deps_map.remove(id);
                resolved.push(*id);
            }
            for deps in deps_map.values_mut() {
                deps.retain(|id| !ready.contains(id));
            }
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy)]
    struct A {
        name: usize,
    }
    impl PacketType for A {
        fn empty() -> Self {
            Self { name: 0 }
        }
        fn from_raw_bytes(_: &[u8]) -> Self {
            unimplemented!()
        }
        fn to_raw_bytes(&self) -> Vec<u8> {
            vec![self.name as u8]
        }
    }

    #[test]
    fn test_simple_hook() {
        let mut registry: HookRegistry<A, A> = HookRegistry::new();
        registry.register_hook(
            PacketState::Received,
            Hook::new(
                "test_hook".into(),
                HookClosure(Box::new(|_, packet| {
                    packet.get_mut_output().name = 2;
                    Ok(1)
                })),
                Vec::default(),
            ),
        );

        let mut packet: PacketContext<A, A> = PacketContext::from(A::empty());
        assert_eq!(packet.get_output().name, 0);
        registry.run_hooks(&mut packet).unwrap();
        assert_eq!(packet.get_output().name, 2);
    }

    #[test]
    fn test_dependency_not_hook() {
        let mut registry: HookRegistry<A, A> = HookRegistry::new();
        let hook1 = Hook::new("test1".into(), HookClosure(Box::new(|_, _| Ok(1))), Vec::default());
        let hook1_id = hook1.id();
        let mut hook2 = Hook::new(
            "test2".into(),
            HookClosure(Box::new(|_, _| {
                panic!("should not run: depends on hook1 failing");
            })),
            Vec::default(),
        );
        hook2.must_not(hook1_id);

        registry.register_hook(PacketState::Received, hook1);
        registry.register_hook(PacketState::Received, hook2);

        let mut packet: PacketContext<A, A> = PacketContext::from(A::empty());
        registry.run_hooks(&mut packet).unwrap();
    }

    #[test]
    fn test_service() {
        let mut registry: HookRegistry<A, A> = HookRegistry::new();
        registry.register_service(Mutex::new(Vec::<usize>::new()));
        registry.register_hook(
            PacketState::Received,
            Hook::new(
                "test_hook".into(),
                HookClosure(Box::new(|services, packet| {
                    let mut services = services.lock().unwrap();
                    let log = services.get_mut::<Mutex<Vec<usize>>>().unwrap();
                    log.lock().unwrap().push(packet.get_output().name);
                    packet.get_mut_output().name = 2;
                    Ok(1)
                })),
                Vec::default(),
            ),
        );

        let mut packet: PacketContext<A, A> = PacketContext::from(A::empty());
        registry.run_hooks(&mut packet).unwrap();
        let services = registry.services();
        let services = services.lock().unwrap();
        assert_eq!(services.get::<Mutex<Vec<usize>>>().unwrap().lock().unwrap().len(), 1);
    }

    #[test]
    fn test_dependency_tree_order() {
        let mut registry: HookRegistry<A, A> = HookRegistry::new();

        let hook3 = Hook::new("t3".into(), HookClosure(Box::new(|_, _| Ok(1))), Vec::default());
        let hook3_id = hook3.id();
        let mut hook1 = Hook::new("t1".into(), HookClosure(Box::new(|_, _| Ok(1))), Vec::default());
        hook1.must(hook3_id);
        let hook1_id = hook1.id();
        let mut hook2 = Hook::new("t2".into(), HookClosure(Box::new(|_, _| Ok(1))), Vec::default());
        hook2.must(hook1_id);
        hook2.must(hook3_id);

        registry.register_hook(PacketState::Received, hook3);
        registry.register_hook(PacketState::Received, hook1);
        registry.register_hook(PacketState::Received, hook2);

        let order = registry.generate_exec_order(&PacketState::Received).unwrap();
        let pos3 = order.iter().position(|id| *id == hook3_id).unwrap();
        let pos1 = order.iter().position(|id| *id == hook1_id).unwrap();
        assert!(pos3 < pos1);
    }
}
