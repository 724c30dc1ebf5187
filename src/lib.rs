pub mod consumer;
pub mod error;
pub mod producer;
pub mod settings;

mod ringbuf;

pub use consumer::RingbufConsumer;
pub use producer::RingbufProducer;
pub use ringbuf::Ringbuf;
