use criterion::{criterion_group, criterion_main, Criterion};
use ptex_atlas::config::AtlasConfig;
use ptex_atlas::layer::TexelGrid;
use ptex_atlas::tiling::atlas_packer::pack_loops;
use ptex_atlas::tiling::primitives::Primitives;
use ptex_atlas::types::{DataType, LogResolution, PolyMesh, TexelFormat};

/// Generate a flat grid of `n x n` quads sharing their vertices.
fn make_quad_grid(n: u32) -> PolyMesh {
    let verts_per_side = n + 1;
    let mut polygons = Vec::with_capacity((n * n) as usize);
    for y in 0..n {
        for x in 0..n {
            let bl = y * verts_per_side + x;
            let br = bl + 1;
            let tl = bl + verts_per_side;
            let tr = tl + 1;
            polygons.push(vec![bl, br, tr, tl]);
        }
    }
    PolyMesh::from_polygons(&polygons).expect("grid mesh")
}

/// One grid per loop, with a mix of sizes so the packer has work to do.
fn make_grids(mesh: &PolyMesh, format: TexelFormat) -> Vec<TexelGrid> {
    (0..mesh.loop_count())
        .map(|i| {
            let logres = LogResolution::new(2 + (i % 3) as u8, 2 + (i % 2) as u8).expect("logres");
            TexelGrid::with_fill(format, logres, &[0.2, 0.4, 0.6, 1.0]).expect("grid")
        })
        .collect()
}

fn bench_pack(c: &mut Criterion) {
    // 32x32 quads = 4096 loops
    let mesh = make_quad_grid(32);
    let format = TexelFormat::new(DataType::Uint8, 4).expect("format");
    let grids = make_grids(&mesh, format);
    let prims = Primitives::default();

    let unfiltered = AtlasConfig {
        filter_borders: false,
        ..Default::default()
    };
    c.bench_function("pack_loops_4k_unfiltered", |b| {
        b.iter(|| pack_loops(&mesh, &grids, &prims, &unfiltered).expect("pack"));
    });

    let filtered = AtlasConfig::default();
    c.bench_function("pack_loops_4k_filtered", |b| {
        b.iter(|| pack_loops(&mesh, &grids, &prims, &filtered).expect("pack"));
    });
}

fn bench_pack_float(c: &mut Criterion) {
    let mesh = make_quad_grid(16);
    let format = TexelFormat::new(DataType::Float32, 3).expect("format");
    let grids = make_grids(&mesh, format);
    let prims = Primitives::default();
    let config = AtlasConfig::default();

    c.bench_function("pack_loops_1k_float_rgb", |b| {
        b.iter(|| pack_loops(&mesh, &grids, &prims, &config).expect("pack"));
    });
}

criterion_group!(benches, bench_pack, bench_pack_float);
criterion_main!(benches);
