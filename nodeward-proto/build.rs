fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Clients only: nodeward never serves these APIs
    tonic_prost_build::configure()
        .build_server(false)
        .build_client(true)
        .compile_protos(
            &[
                "../proto/common.proto",
                "../proto/machine/machine.proto",
                "../proto/time/time.proto",
                "../proto/resource/resource.proto",
            ],
            &["../proto"],
        )?;

    Ok(())
}
