pub mod knife;
