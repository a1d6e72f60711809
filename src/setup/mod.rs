pub mod dir_setup;
