use anyhow::Context;
use clap::{Parser, Subcommand};
use fhir::{MedicationDispense, Patient, ResourceKind, ValidatedRecord};
use mdr_core::{
    database_name_from_env_value, store, CoreConfig, MedicationService, PatientCreation,
    PatientService,
};
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "mdr")]
#[command(about = "MDR medication dispense record CLI")]
struct Cli {
    /// Document store URI (`mongodb://...`, `mongodb+srv://...` or `memory://`)
    #[arg(long, env = "MONGO_URI", global = true)]
    uri: Option<String>,

    /// Database name; defaults to the URI path, then `SamplePatientService`
    #[arg(long, env = "MONGO_DB", global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a patient from a FHIR Patient JSON file
    CreatePatient {
        /// Path to the Patient JSON document
        file: PathBuf,
    },
    /// Show a patient by record id
    GetPatient {
        /// Patient record id
        id: String,
    },
    /// Find a patient by business identifier
    FindPatient {
        /// Identifier system
        system: String,
        /// Identifier value
        value: String,
    },
    /// Record a medication dispense from a JSON request file
    Dispense {
        /// Patient record id
        patient_id: String,
        /// Path to the dispense request JSON document
        file: PathBuf,
    },
    /// List a patient's dispenses, most recent first
    ListDispenses {
        /// Patient record id
        patient_id: String,
    },
    /// Validate a JSON file without touching the store
    Validate {
        /// Resource kind: `Patient` or `MedicationDispense`
        kind: ResourceKind,
        /// Path to the JSON document
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let Cli {
        uri,
        database,
        command,
    } = Cli::parse();

    if let Commands::Validate { kind, file } = &command {
        return validate_file(*kind, file);
    }

    let uri = uri.context("MONGO_URI must be set (or pass --uri)")?;
    let database = database_name_from_env_value(&uri, database);
    let cfg = CoreConfig::new(uri, database)?;
    let collections = store::connect(&cfg).await?;

    match command {
        Commands::CreatePatient { file } => {
            let service = PatientService::new(&collections);
            match service.create_patient(&read_json(&file)?).await? {
                PatientCreation::Created(id) => println!("Created patient {id}"),
                PatientCreation::Existing(id) => println!("Patient already registered as {id}"),
            }
        }
        Commands::GetPatient { id } => {
            let patient = PatientService::new(&collections)
                .get_patient_by_id(&id)
                .await?;
            print_json(&Patient::render(&patient)?)?;
        }
        Commands::FindPatient { system, value } => {
            let patient = PatientService::new(&collections)
                .get_patient_by_identifier(&system, &value)
                .await?;
            print_json(&Patient::render(&patient)?)?;
        }
        Commands::Dispense { patient_id, file } => {
            let id = MedicationService::new(&collections)
                .register_dispense(&patient_id, &read_json(&file)?)
                .await?;
            println!("Recorded dispense {id} for patient {patient_id}");
        }
        Commands::ListDispenses { patient_id } => {
            let dispenses = MedicationService::new(&collections)
                .list_dispenses_for_patient(&patient_id)
                .await?;
            if dispenses.is_empty() {
                println!("No dispenses found.");
            } else {
                let rendered = dispenses
                    .iter()
                    .map(MedicationDispense::render)
                    .collect::<Result<Vec<_>, _>>()?;
                print_json(&Value::Array(rendered))?;
            }
        }
        Commands::Validate { .. } => {} // handled before connecting
    }

    Ok(())
}

fn validate_file(kind: ResourceKind, file: &Path) -> anyhow::Result<()> {
    let payload = read_json(file)?;
    match fhir::validate(kind, &payload)? {
        ValidatedRecord::Patient(data) => {
            println!(
                "Valid Patient: {} identifier(s), {} name(s)",
                data.identifiers.len(),
                data.names.len()
            );
        }
        ValidatedRecord::MedicationDispense(request) => {
            println!(
                "Valid MedicationDispense request: {} x {} {}",
                request.medication.text.as_deref().unwrap_or("(coded)"),
                request.quantity.value,
                request.quantity.unit
            );
        }
    }
    Ok(())
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
