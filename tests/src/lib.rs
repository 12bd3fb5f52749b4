pub mod framework;

pub use mock_upf::MockUpf;
