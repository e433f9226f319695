pub mod lcs;
