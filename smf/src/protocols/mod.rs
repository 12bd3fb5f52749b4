pub mod n4;
