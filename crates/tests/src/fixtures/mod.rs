pub mod scripted;
pub mod test_app;
