mod system_desc;

pub use system_desc::SoundSystemDesc;
