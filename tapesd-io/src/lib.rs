//! The device abstraction (§4.4): a uniform operation set over several
//! backends (real tape, regular file, named pipe, virtual tape), plus
//! the capability flags each backend actually supports.

mod device;
mod file_device;
mod linux_mtio;
mod linux_tape;
mod pipe_device;
mod virtual_tape;

pub use device::*;
pub use file_device::FileDevice;
pub use linux_tape::LinuxTapeDevice;
pub use pipe_device::PipeDevice;
pub use virtual_tape::VirtualTapeDevice;
