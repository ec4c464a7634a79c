//! Flutter bridge for the authflow state layer.

pub mod api;
