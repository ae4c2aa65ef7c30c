mod action;
mod sensor;
mod switch;

pub use action::PowerAction;
pub use sensor::SensorEntity;
pub use switch::SwitchEntity;
