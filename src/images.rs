// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! The rendering side: pipelines, passes, stages and the director that schedules them. */

pub(crate) mod compute_pass;
pub mod director;
pub mod pipeline;
pub mod render_pass;
pub(crate) mod shader;
pub mod stage;
pub mod vertex_layout;
