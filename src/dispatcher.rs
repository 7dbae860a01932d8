//! A small command bus, used by components to emit events to their parents.

use core::{
	cell::RefCell,
	fmt::{self, Debug, Formatter},
};
use serde_json::Value;
use std::{
	collections::BTreeMap,
	rc::{Rc, Weak},
};
use tracing::{trace, warn};

/// A subscriber. Identity is the identity of the shared closure.
#[derive(Clone)]
pub struct CommandHandler(Rc<dyn Fn(&Value)>);
impl CommandHandler {
	pub fn new(f: impl 'static + Fn(&Value)) -> Self {
		Self(Rc::new(f))
	}

	pub fn call(&self, payload: &Value) {
		(self.0)(payload)
	}

	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}
impl Debug for CommandHandler {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("CommandHandler").field(&Rc::as_ptr(&self.0)).finish()
	}
}

type AfterHandler = Rc<dyn Fn()>;

#[derive(Default)]
struct Registry {
	subscriptions: BTreeMap<String, Vec<CommandHandler>>,
	after: Vec<AfterHandler>,
}

/// Undoes a [`Dispatcher::subscribe`] or [`Dispatcher::after_every_command`].
///
/// Dropping a [`Subscription`] without calling [`Subscription::unsubscribe`] keeps the handler registered.
#[must_use = "Dropping a Subscription keeps the handler registered."]
pub struct Subscription(Option<Box<dyn FnOnce()>>);
impl Subscription {
	fn noop() -> Self {
		Self(None)
	}

	pub fn unsubscribe(mut self) {
		if let Some(unsubscribe) = self.0.take() {
			unsubscribe()
		}
	}
}
impl Debug for Subscription {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Subscription").field(&self.0.is_some()).finish()
	}
}

/// Named-command pub/sub.
///
/// Handlers are invoked synchronously in registration order.
/// Clones share their registrations.
#[derive(Clone, Default)]
pub struct Dispatcher(Rc<RefCell<Registry>>);

impl Dispatcher {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `handler` for `name`.
	///
	/// Subscribing the same handler to the same name again does nothing, and the returned [`Subscription`] doesn't either.
	pub fn subscribe(&self, name: impl Into<String>, handler: CommandHandler) -> Subscription {
		let name = name.into();
		{
			let mut registry = self.0.borrow_mut();
			let handlers = registry.subscriptions.entry(name.clone()).or_default();
			if handlers.iter().any(|existing| existing.ptr_eq(&handler)) {
				trace!("Handler is already subscribed to {:?}.", name);
				return Subscription::noop();
			}
			handlers.push(handler.clone());
		}

		let registry = Rc::downgrade(&self.0);
		Subscription(Some(Box::new(move || {
			if let Some(registry) = Weak::upgrade(&registry) {
				if let Some(handlers) = registry.borrow_mut().subscriptions.get_mut(&name) {
					handlers.retain(|existing| !existing.ptr_eq(&handler))
				}
			}
		})))
	}

	/// Registers `handler` to run after each dispatch, whatever its name.
	pub fn after_every_command(&self, handler: impl 'static + Fn()) -> Subscription {
		let handler: AfterHandler = Rc::new(handler);
		self.0.borrow_mut().after.push(handler.clone());

		let registry = Rc::downgrade(&self.0);
		Subscription(Some(Box::new(move || {
			if let Some(registry) = Weak::upgrade(&registry) {
				registry.borrow_mut().after.retain(|existing| !Rc::ptr_eq(existing, &handler))
			}
		})))
	}

	/// Invokes the handlers subscribed to `name` with `payload`, then every after-command handler.
	///
	/// Handlers may (un)subscribe while being dispatched to. Such changes take effect with the next dispatch.
	pub fn dispatch(&self, name: &str, payload: &Value) {
		let handlers = self.0.borrow().subscriptions.get(name).cloned().unwrap_or_default();
		if handlers.is_empty() {
			warn!("No handlers for command: {}", name);
		}
		for handler in handlers {
			handler.call(payload)
		}

		let after = self.0.borrow().after.clone();
		for handler in after {
			handler()
		}
	}
}

impl Debug for Dispatcher {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let registry = self.0.borrow();
		f.debug_struct("Dispatcher")
			.field("commands", &registry.subscriptions.keys().collect::<Vec<_>>())
			.field("after_every_command", &registry.after.len())
			.finish()
	}
}
