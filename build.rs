/// Build script for depth_complexity
///
/// # Shader Compilation Strategy:
/// - Software: shading is done on the CPU rasterizer, no shader files
/// - DX12: HLSL embedded with include_str! and compiled at runtime via D3DCompile
fn main() {
    // Trigger rebuild if shader files change
    println!("cargo:rerun-if-changed=src/gfx/dx12/shaders/default.hlsl");
}
