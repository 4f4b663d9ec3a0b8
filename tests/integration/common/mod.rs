pub mod stub_provider;
