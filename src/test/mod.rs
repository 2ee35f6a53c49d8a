mod support;

mod ack_replace;
mod wire_frame;
