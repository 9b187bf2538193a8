pub mod role_panel;
pub mod set;
