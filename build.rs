fn main() {
    // GPU Acceleration Detection and Build Guidance
    detect_and_report_gpu_capabilities();

    #[cfg(target_os = "macos")]
    {
        println!("cargo:rustc-link-lib=framework=AVFoundation");
        println!("cargo:rustc-link-lib=framework=Cocoa");
        println!("cargo:rustc-link-lib=framework=Foundation");
    }
}

/// Detects GPU acceleration capabilities and provides build guidance
fn detect_and_report_gpu_capabilities() {
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();

    println!("cargo:warning=Building streamvox-core for: {}", target_os);

    match target_os.as_str() {
        "macos" => {
            println!("cargo:warning=macOS: Metal GPU acceleration ENABLED by default");
            #[cfg(feature = "coreml")]
            println!("cargo:warning=CoreML acceleration ENABLED");
        }
        "windows" => {
            if cfg!(feature = "cuda") {
                println!("cargo:warning=Windows: CUDA GPU acceleration ENABLED");
            } else if cfg!(feature = "vulkan") {
                println!("cargo:warning=Windows: Vulkan GPU acceleration ENABLED");
            } else {
                println!("cargo:warning=Windows: Using CPU-only mode");
                println!("cargo:warning=For NVIDIA GPU: cargo build --release --features cuda");
                println!("cargo:warning=For AMD/Intel GPU: cargo build --release --features vulkan");

                // Try to detect NVIDIA GPU
                if which::which("nvidia-smi").is_ok() {
                    println!("cargo:warning=NVIDIA GPU detected! Consider rebuilding with --features cuda");
                }
            }
        }
        "linux" => {
            if cfg!(feature = "cuda") {
                println!("cargo:warning=Linux: CUDA GPU acceleration ENABLED");
            } else if cfg!(feature = "vulkan") {
                println!("cargo:warning=Linux: Vulkan GPU acceleration ENABLED");
            } else if cfg!(feature = "hipblas") {
                println!("cargo:warning=Linux: AMD ROCm (HIP) acceleration ENABLED");
            } else {
                println!("cargo:warning=Linux: Using CPU-only mode");
                println!("cargo:warning=For NVIDIA GPU: cargo build --release --features cuda");
                println!("cargo:warning=For AMD GPU: cargo build --release --features hipblas");

                if which::which("nvidia-smi").is_ok() {
                    println!("cargo:warning=NVIDIA GPU detected! Consider rebuilding with --features cuda");
                }
                if which::which("rocm-smi").is_ok() {
                    println!("cargo:warning=AMD GPU detected! Consider rebuilding with --features hipblas");
                }
            }
        }
        _ => {
            println!("cargo:warning=Unknown platform: {}", target_os);
        }
    }
}
