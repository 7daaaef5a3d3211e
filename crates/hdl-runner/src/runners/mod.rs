mod icarus;
mod odin;
mod yosys;

pub use icarus::Icarus;
pub use odin::Odin;
pub use yosys::Yosys;
