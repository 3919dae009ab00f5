pub mod archive;
pub mod name_codec;
pub mod registry;
pub mod upload;
