pub mod bus;
pub mod error;
pub mod replay;
pub mod sup;
pub mod timer;
pub mod wire;

#[cfg(test)]
mod test;
