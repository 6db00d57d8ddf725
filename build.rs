fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(feature = "etcd")]
    {
        println!("cargo:rerun-if-changed=proto/etcd/rpc.proto");
        tonic_build::configure()
            .build_server(false)
            .compile_protos(&["proto/etcd/rpc.proto"], &["proto"])?;
    }

    Ok(())
}
