// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod output_selection;

pub use output_selection::OutputSelection;
