//! Application entry point: One root component mounted into one host node.

use crate::{
	component::{Component, ComponentType},
	render::Renderer,
	scheduler::Scheduler,
	surface::{NodeId, Surface},
	vnode::{component, no_children, Props, VNode},
	Error,
};
use std::rc::Rc;
use tracing::instrument;

/// Creates an app that renders `root` with `props`, draining lifecycle callbacks only on [`App::next_tick`].
pub fn create_app(surface: Rc<dyn Surface>, root: &ComponentType, props: Props) -> App {
	create_app_with_scheduler(surface, Scheduler::new(), root, props)
}

/// Like [`create_app`], but with a preconfigured [`Scheduler`] (e.g. one that drains itself).
pub fn create_app_with_scheduler(surface: Rc<dyn Surface>, scheduler: Scheduler, root: &ComponentType, props: Props) -> App {
	App {
		renderer: Renderer::new(surface, scheduler),
		root: root.clone(),
		props,
		vdom: None,
		host: None,
	}
}

#[derive(Debug)]
pub struct App {
	renderer: Renderer,
	root: ComponentType,
	props: Props,
	vdom: Option<VNode>,
	host: Option<NodeId>,
}

impl App {
	/// Mounts a fresh instance of the root component, appended to `host`.
	///
	/// Its `on_mounted` hook is queued on the scheduler.
	///
	/// # Errors
	///
	/// - [`Error::AppAlreadyMounted`] iff mounted already.
	/// - Any error encountered while mounting.
	#[instrument(skip(self), fields(root = self.root.name()))]
	pub fn mount(&mut self, host: NodeId) -> Result<(), Error> {
		if self.vdom.is_some() {
			return Err(Error::AppAlreadyMounted);
		}

		let mut vdom = component(&self.root, self.props.clone(), no_children());
		self.renderer.mount_node(&mut vdom, host, None, None)?;
		self.vdom = Some(vdom);
		self.host = Some(host);
		Ok(())
	}

	/// Destroys the root component's tree. The app can be mounted again afterwards.
	///
	/// Its `on_unmounted` hook is queued on the scheduler.
	///
	/// # Errors
	///
	/// - [`Error::AppNotMounted`] iff not mounted.
	/// - Any error encountered while destroying.
	#[instrument(skip(self), fields(root = self.root.name()))]
	pub fn unmount(&mut self) -> Result<(), Error> {
		let mut vdom = self.vdom.take().ok_or(Error::AppNotMounted)?;
		self.host = None;
		self.renderer.destroy_node(&mut vdom)
	}

	/// Runs pending scheduled work (lifecycle hooks, batched re-renders) to completion.
	pub fn next_tick(&self) {
		self.renderer.scheduler().settle()
	}

	#[must_use]
	pub fn is_mounted(&self) -> bool {
		self.vdom.is_some()
	}

	#[must_use]
	pub fn host(&self) -> Option<NodeId> {
		self.host
	}

	/// The mounted root component instance.
	#[must_use]
	pub fn root(&self) -> Option<Component> {
		match &self.vdom {
			Some(VNode::Component(node)) => node.instance().cloned(),
			_ => None,
		}
	}

	#[must_use]
	pub fn surface(&self) -> &Rc<dyn Surface> {
		self.renderer.surface()
	}

	#[must_use]
	pub fn scheduler(&self) -> &Scheduler {
		self.renderer.scheduler()
	}
}
