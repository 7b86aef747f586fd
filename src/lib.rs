//! This library crate contains all the necessities to run an object-storage notification dispatcher.
//!
//! Bucket notifications arrive over a message bus; each one announcing a freshly uploaded object
//! is translated into a Kubernetes Job which runs the OCR worker against that object.
//!
//! Submodules have been introduced to split responsibilities. They together form a chain of dependencies
//! from the low-level [`library`], over the notification and workload [`domain`], through the executable
//! [`harness`], up to the high-level [`modules`](module) and contained service implementations.

#![deny(missing_docs)]

pub mod constants;
pub mod domain;
pub mod harness;
pub mod library;
pub mod module;
