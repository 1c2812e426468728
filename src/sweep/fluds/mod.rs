//! Flux data structures (FLUDS): where each face's angular flux lives while
//! a direction is swept.
//!
//! Setup runs in two passes per sweep plan. The [`alpha`] pass walks the
//! local sweep order and assigns every local face a slot in a small,
//! reusable buffer. The [`beta`] pass tells each downstream rank how the
//! faces it will receive are laid out. The result, [`FludsCommonData`], is
//! shared read-only by every angle set of the plan; each angle set then owns
//! a [`Fluds`] sized for its own angles and groups.

pub mod alpha;
pub mod beta;
pub mod common;
pub mod compact_view;
pub mod data;
pub mod lockbox;

pub use alpha::{AlphaPass, AlphaPassOutput, CellFaceSlots, DownwindTarget, UpwindSource};
pub use beta::{BETA_TAGS, BetaPass, BetaPhase, BetaStats};
pub use common::FludsCommonData;
pub use compact_view::{CompactCellView, CompactFaceView};
pub use data::Fluds;
pub use lockbox::{FaceTag, LockBox, SlotIndex};
