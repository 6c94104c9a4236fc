pub mod assignment;
pub mod corridor;
pub mod couriers;
pub mod editor;
pub mod locks;
pub mod navigation;
pub mod processor;
pub mod sequencer;
