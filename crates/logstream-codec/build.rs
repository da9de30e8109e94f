fn main() -> std::io::Result<()> {
    prost_build::Config::new().compile_protos(&["proto/aggregated_record.proto"], &["proto/"])
}
