pub mod object;
pub mod object_function;
pub mod object_manager;
pub mod object_native_function;
pub mod object_string;
