#![doc(html_root_url = "https://docs.rs/twig-dom/0.1.0")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! A keyed virtual-tree reconciler with a small component runtime.
//!
//! Virtual trees ([`VNode`]) are mounted onto a [`Surface`] and patched in place when they change:
//! Sibling lists are diffed with [`diff_sequence`], so keyed children keep their live nodes when reordered.
//!
//! [`Component`]s re-render when their props or state change.
//! Their lifecycle hooks, and batched state re-renders, run as jobs on a [`Scheduler`].
//!
//! [`HeadlessSurface`] keeps everything in memory, [`web::DomSurface`] drives a browser DOM.

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod app;
pub mod component;
pub mod dispatcher;
mod error;
pub mod headless;
pub mod render;
pub mod scheduler;
pub mod sequence;
pub mod surface;
pub mod vnode;
pub mod web;

pub use app::{create_app, create_app_with_scheduler, App};
pub use component::{define_component, Component, ComponentDef, ComponentType};
pub use dispatcher::{Dispatcher, Subscription};
pub use error::Error;
pub use headless::HeadlessSurface;
pub use render::Renderer;
pub use scheduler::{Completion, Scheduler};
pub use sequence::{diff_sequence, DiffOp};
pub use surface::{insert, Listener, NodeId, Surface};
pub use vnode::{component, element, fragment, nodes_equal, slot, text, Class, Handler, Props, VNode};
