fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Compile the recommendation service proto (server and client; the
    // client is used by the in-process stream tests)
    tonic_build::compile_protos("../../proto/recommendation.proto")?;
    Ok(())
}
