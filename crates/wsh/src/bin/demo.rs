//! A tiny demonstration of the kernel: create a tenant with loopback
//! networking, accept one connection on the in-memory transport, and echo
//! back whatever it sends.

use wsh::{ByteStream, Cap, CreateTenantOptions, Kernel, Limits};

#[tokio::main]
async fn main() {
    wsh::install_tracing();

    let kernel = Kernel::new(Limits::default());
    let tenant = kernel
        .create_tenant(CreateTenantOptions {
            capabilities: vec![Cap::Loopback, Cap::Clock, Cap::Trace],
            ..Default::default()
        })
        .expect("tenant creation should succeed with no kernel yet closed");

    let network = tenant
        .network
        .as_ref()
        .expect("loopback capability should have produced a scoped network");

    let listener = network
        .listen("mem://localhost:9000")
        .await
        .expect("listening on an unused loopback port should succeed");

    let server = tokio::spawn({
        let listener = listener.clone();
        async move {
            let socket = listener.accept().await.expect("a client should connect");
            if let Some(chunk) = socket.read().await {
                let _ = socket.write(chunk);
            }
        }
    });

    let client = network
        .connect("mem://localhost:9000")
        .await
        .expect("connecting to a listening loopback port should succeed");
    client
        .write(bytes::Bytes::from_static(b"hello from the demo"))
        .expect("writing to a fresh socket should succeed");

    if let Some(echoed) = client.read().await {
        println!("echoed: {}", String::from_utf8_lossy(&echoed));
    }

    server.await.expect("server task should not panic");

    let snapshot = kernel.metrics();
    println!(
        "tenants created={} destroyed={}",
        snapshot.tenants_created, snapshot.tenants_destroyed
    );

    kernel.close();
}
