pub mod bmp_builder;
