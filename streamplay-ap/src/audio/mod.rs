//! Audio processing
//!
//! Container parsing, size patching, decoding and output devices.

pub mod aiff;
pub mod codec;
pub mod decoder;
pub mod output;
pub mod patch;
pub mod resampler;
pub mod types;
pub mod virtual_output;
pub mod wav;

pub use codec::{Codec, SchedulingStrategy};
pub use output::{CpalOutputFactory, OutputDevice, OutputFactory, OutputUnit, UnitHandle};
pub use types::{AudioFormat, ContainerDescriptor, DecodedAudio};
pub use virtual_output::{ManualClock, OutputProbe, VirtualOutputFactory};
