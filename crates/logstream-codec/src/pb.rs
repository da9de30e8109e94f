include!(concat!(env!("OUT_DIR"), "/logstream.codec.rs"));
