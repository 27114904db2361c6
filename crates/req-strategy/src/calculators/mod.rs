pub mod branch_size;
