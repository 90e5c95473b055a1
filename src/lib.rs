#![doc(html_root_url = "https://docs.rs/reflex-dom/0.0.1")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod attribute;
pub mod config;
mod custom_element;
pub mod diff;
pub mod effect;
pub mod event;
pub mod facts;
pub mod load;
pub mod navigation;
pub mod node;
pub mod patch;
mod registry;
pub mod widget;

pub use config::Config;
pub use diff::{diff, Patch};
pub use effect::{Effect, EffectError, Port};
pub use event::{Decoded, DecodeError, EventHandler, EventNode, EventPhase, Message, Sink, Tagger};
pub use facts::{FactTable, FactsDiff, Setting, Value};
pub use load::virtualize;
pub use node::{Custom, CustomPatch, Node, NodeKind, ThunkRef};
pub use patch::DomPatcher;
pub use widget::{Application, Program, Transaction, Widget};
