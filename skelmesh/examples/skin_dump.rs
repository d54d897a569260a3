use skelmesh::{
    ImportOptions, MeshPolicy, NullTextureLoader, SkeletalMesh, SkeletalMeshComponent,
    load_skeletal_mesh,
};
use std::{env, path::Path, sync::Arc};
use tracing_subscriber::EnvFilter;

fn usage() -> ! {
    eprintln!(
        "Usage:\n  skin_dump <scene.json|scene.skmc> [--anim <name>] [--time <seconds>] [--loop 0|1]\n            [--policy first|merge] [--unit <cm-per-unit>] [--cook]\n"
    );
    std::process::exit(2);
}

fn parse_policy(s: &str) -> Result<MeshPolicy, String> {
    match s {
        "first" => Ok(MeshPolicy::FirstOnly),
        "merge" => Ok(MeshPolicy::Merge),
        _ => Err(format!("invalid --policy {s}")),
    }
}

fn json_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

fn fmt_vec3(v: [f32; 3]) -> String {
    format!("[{:.6},{:.6},{:.6}]", v[0], v[1], v[2])
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty() {
        usage();
    }
    let scene_path = Path::new(&args[0]).to_path_buf();
    args.drain(0..1);

    let mut options = ImportOptions::default();
    let mut anim: Option<String> = None;
    let mut time: f32 = 0.0;
    let mut looped = true;

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--anim" if i + 1 < args.len() => {
                anim = Some(args[i + 1].to_string());
                i += 2;
            }
            "--time" if i + 1 < args.len() => {
                time = args[i + 1].parse::<f32>().unwrap_or(0.0);
                i += 2;
            }
            "--loop" if i + 1 < args.len() => {
                looped = args[i + 1].parse::<i32>().unwrap_or(1) != 0;
                i += 2;
            }
            "--policy" if i + 1 < args.len() => {
                options.mesh_policy = parse_policy(&args[i + 1]).unwrap_or_else(|e| {
                    eprintln!("{e}");
                    usage();
                });
                i += 2;
            }
            "--unit" if i + 1 < args.len() => {
                options.target_unit_scale = args[i + 1].parse::<f64>().ok();
                i += 2;
            }
            "--cook" => {
                options.write_cooked_cache = true;
                i += 1;
            }
            _ => usage(),
        }
    }

    let data = load_skeletal_mesh(&scene_path, &options, &mut NullTextureLoader).unwrap_or_else(
        |e| {
            eprintln!("failed to import {}: {e}", scene_path.display());
            std::process::exit(2);
        },
    );
    let mesh = Arc::new(SkeletalMesh::new(data));
    let mut component = SkeletalMeshComponent::with_mesh(mesh.clone());

    if let Some(name) = anim.as_deref() {
        if !component.play_animation(name, looped) {
            eprintln!("animation {name} not found");
            std::process::exit(2);
        }
    }
    let stats = component.tick(time);
    let bounds = component.skinned_buffer().bounds();
    let render = mesh.render_data();

    println!("{{");
    println!("  \"object\": \"{}\",", json_escape(&render.object_name));
    println!("  \"anim\": {},", match anim.as_deref() {
        Some(name) => format!("\"{}\"", json_escape(name)),
        None => "null".to_string(),
    });
    println!("  \"time\": {time:.6},");
    println!("  \"vertices\": {},", render.vertices.len());
    println!("  \"triangles\": {},", render.triangle_count());
    println!(
        "  \"stats\": {{\"skinned\": {}, \"rigid\": {}, \"invalidInfluences\": {}}},",
        stats.skinned_vertices, stats.rigid_vertices, stats.invalid_influences
    );
    println!(
        "  \"bounds\": {{\"min\": {}, \"max\": {}}},",
        fmt_vec3(bounds.min.to_array()),
        fmt_vec3(bounds.max.to_array())
    );

    println!("  \"bones\": [");
    let globals = component.bone_global_transforms();
    let bones = render.skeleton.bones();
    for (i, bone) in bones.iter().enumerate() {
        let origin = globals
            .get(i)
            .map(|m| m.w_axis.truncate().to_array())
            .unwrap_or_default();
        let parent = bone
            .parent
            .map_or_else(|| "null".to_string(), |p| p.to_string());
        let comma = if i + 1 == bones.len() { "" } else { "," };
        println!(
            "    {{\"name\": \"{}\", \"parent\": {parent}, \"origin\": {}}}{comma}",
            json_escape(&bone.name),
            fmt_vec3(origin)
        );
    }
    println!("  ],");

    println!("  \"subsets\": [");
    for (i, subset) in render.subsets.iter().enumerate() {
        let comma = if i + 1 == render.subsets.len() { "" } else { "," };
        println!(
            "    {{\"material\": \"{}\", \"start\": {}, \"count\": {}}}{comma}",
            json_escape(&subset.material_name),
            subset.index_start,
            subset.index_count
        );
    }
    println!("  ]");
    println!("}}");
}
