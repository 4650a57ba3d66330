pub mod candidate;
pub mod role;
pub mod verdict;
