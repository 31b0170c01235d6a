// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! frame_director is a retained-mode GPU frame scheduler.

Client code describes resources once (buffers carved into named areas, textures, samplers,
shaders, bindings, pipelines, passes) and the director takes it from there: it creates the
device objects when their inputs are available, uploads only what changed, and records each
frame's passes in a stable order.

| Concern              | What the director does                                                          |
|----------------------|---------------------------------------------------------------------------------|
| Lifetimes            | Reference-counts every resource; dependents keep their inputs alive              |
| Updates              | Generational update list: a resource is touched only in ticks where it changed   |
| Completeness         | Draws whose textures, bindings or pipelines aren't ready are skipped, not failed |
| Ordering             | Stages in insertion order, passes in stage order, calls in pass order            |
| Device asynchrony    | Device acquisition and pipeline compiles are polled once per tick, never awaited |

# Frame loop

```
use frame_director::Director;
use frame_director::bindings::texture::Viewport;
use frame_director::imp::recording::RecordingBackend;

let mut director = Director::with_backend(RecordingBackend::new(), Viewport::new(320, 240));
director.add_stage("scene").unwrap();
director.add_stage("overlay").unwrap();
for _ in 0..3 {
    let report = director.tick().unwrap();
    assert_eq!(report.stages_rendered, 2);
}
assert_eq!(director.frame(), 3);
```

# Backends

The director talks to the device only through [`imp::Backend`].  The production backend is
[wgpu](https://wgpu.rs) (feature `backend_wgpu`, on by default), which brings DX12, Vulkan,
Metal, WebGPU and WebGL along.  [`imp::recording::RecordingBackend`] is a headless stand-in
that logs every request, for tests and tooling.

# Logging

Everything is logged through [logwise](https://sealedabstract.com/code/logwise).  Device
problems surface as `error`, recoverable oddities (a surface with no image this frame, a
format that can't be mipmapped) as `warn`, and per-resource scheduling as `trace`.
*/

pub mod bindings;
mod error;
pub mod images;
pub mod imp;
pub mod pixel_formats;

pub use error::Error;
pub use images::director::{Director, MemoryReport, TickReport};
pub use pixel_formats::PixelFormat;
