use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use std::{fs, path::Path};

use zk_login::types::input::ZkLoginParams;
use zk_login::utils::circuit_stats::print_circuit_stats;
use zk_login::utils::native::{nonce_b64, EPH_PK_BYTES, SECRET_BYTES};
use zk_login::utils::parsing::{bytes_be_to_u32_limbs_le, hex_to_bytes_fixed};

/// Command-line arguments for the zk-login proof generator
#[derive(Parser)]
#[command(name = "zk-login")]
#[command(about = "Prove possession of an RSA-signed OpenID token with plonky2")]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(short, long, default_value = "build", help = "Output directory for artifacts")]
    output_dir: String,

    #[arg(short, long, help = "JSON file with circuit capacities (defaults otherwise)")]
    params: Option<String>,
}

#[derive(Parser)]
enum Commands {
    /// Build the circuit and print its statistics
    Build,
    /// Build the circuit and prove a witness file
    Prove {
        #[arg(short, long, help = "Input JSON file with witness data")]
        input: String,
    },
    /// Print the nonce a token request must carry
    Nonce {
        #[arg(long, help = "Ephemeral public key, 32 bytes hex")]
        eph_public_key: String,
        #[arg(long)]
        max_epoch: u32,
        #[arg(long, help = "Randomness, 16 bytes hex")]
        randomness: String,
    },
}

fn load_params(path: Option<&str>) -> Result<ZkLoginParams> {
    match path {
        Some(p) => {
            println!("Loading circuit capacities from: {}", p);
            Ok(serde_json::from_str(&fs::read_to_string(p)?)?)
        }
        None => Ok(ZkLoginParams::default()),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    use std::time::Instant;

    println!("=== ZK-LOGIN PLONKY2 PROOF SYSTEM ===");
    let total_start = Instant::now();

    let build_dir = Path::new(&args.output_dir);
    if !build_dir.exists() {
        fs::create_dir_all(build_dir)?;
    }

    match args.command {
        Some(Commands::Build) => {
            use zk_login::circuits::zk_login::build_zk_login_circuit;

            let params = load_params(args.params.as_deref())?;
            println!("\nBuilding zk-login circuit...");
            let build_start = Instant::now();
            let circuit = build_zk_login_circuit(&params)?;
            println!("Circuit build time: {:?}", build_start.elapsed());
            print_circuit_stats("zk-login", &circuit.data.common);
        }
        Some(Commands::Prove { input }) => {
            use zk_login::circuits::zk_login::build_zk_login_circuit;
            use zk_login::commands::prove::generate_zk_login_proof;

            let params = load_params(args.params.as_deref())?;
            println!("\nBuilding zk-login circuit...");
            let build_start = Instant::now();
            let circuit = build_zk_login_circuit(&params)?;
            println!("Circuit build time: {:?}", build_start.elapsed());
            print_circuit_stats("zk-login", &circuit.data.common);

            println!("\n=== GENERATING ZK-LOGIN PROOF ===");
            generate_zk_login_proof(&circuit, &input, build_dir)?;
        }
        Some(Commands::Nonce {
            eph_public_key,
            max_epoch,
            randomness,
        }) => {
            let pk = bytes_be_to_u32_limbs_le(&hex_to_bytes_fixed(&eph_public_key, EPH_PK_BYTES)?);
            let r = bytes_be_to_u32_limbs_le(&hex_to_bytes_fixed(&randomness, SECRET_BYTES)?);
            println!("Nonce: {}", nonce_b64(&pk, max_epoch, &r)?);
        }
        None => {
            println!("\nNo command specified. Available commands:");
            println!("  cargo run --release --bin zk-login -- build");
            println!("  cargo run --release --bin zk-login -- prove --input inputs/witness.json");
            println!("  cargo run --release --bin zk-login -- --params inputs/params.json prove --input inputs/witness.json");
            println!("  cargo run --release --bin zk-login -- nonce --eph-public-key <hex32> --max-epoch 10 --randomness <hex16>");
        }
    }

    println!("\nTotal execution time: {:?}", total_start.elapsed());
    println!("Artifacts saved to: {}", build_dir.display());
    println!("=== EXECUTION COMPLETE ===");

    Ok(())
}
