// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0

/// Why a device could not be acquired.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no suitable adapter: {0}")]
    NoSuchAdapter(#[from] wgpu::RequestAdapterError),
    #[error(transparent)]
    RequestDevice(#[from] wgpu::RequestDeviceError),
}

impl From<Error> for crate::Error {
    fn from(error: Error) -> Self {
        crate::Error::Device(error.to_string())
    }
}
