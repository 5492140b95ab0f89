pub mod grid;
pub mod indexed_vec;
