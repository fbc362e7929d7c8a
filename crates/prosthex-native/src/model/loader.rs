//! Loading trained models from a model directory
//!
//! An echo state network lives in `current_reservoir.json` plus
//! `current_output_weights.json`; a GMLVQ model in `gmlvq_model.json`. Both
//! may sit next to an optional `transfer_mapping.json`.

use std::fs;
use std::path::Path;

use nalgebra::DMatrix;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use prosthex_core::error::ProcessingError;

use super::document::{scaling_from, GmlvqFile, OutputFile, ReservoirFile, TransferFile};
use super::error::{ModelError, ModelResult};
use crate::ml::esn::{fold_transfer, ReservoirNetwork};
use crate::ml::gmlvq::PrototypeClassifier;

/// Reservoir and input weights of an echo state network
pub const RESERVOIR_FILE: &str = "current_reservoir.json";
/// Readout weights of an echo state network
pub const OUTPUT_WEIGHTS_FILE: &str = "current_output_weights.json";
/// GMLVQ model list
pub const GMLVQ_FILE: &str = "gmlvq_model.json";
/// Optional electrode placement transfer mapping
pub const TRANSFER_FILE: &str = "transfer_mapping.json";

/// Read and parse a JSON document.
///
/// # Errors
///
/// - [`ModelError::MissingResource`] if `path` does not exist
/// - [`ModelError::Io`] if it cannot be read
/// - [`ModelError::Json`] if it does not parse into `T`
pub fn read_document<T: DeserializeOwned>(path: &Path) -> ModelResult<T> {
    if !path.exists() {
        return Err(ModelError::MissingResource { path: path.to_path_buf() });
    }
    let text = fs::read_to_string(path).map_err(|source| ModelError::Io { path: path.to_path_buf(), source })?;
    Ok(serde_json::from_str(&text)?)
}

/// Transfer mapping in `dir`, or `None` if the directory has none.
///
/// # Errors
///
/// Any error of [`read_document`] other than a missing file, plus
/// [`ModelError::Format`] for a malformed matrix.
pub fn load_transfer(dir: &Path) -> ModelResult<Option<DMatrix<f64>>> {
    let path = dir.join(TRANSFER_FILE);
    if !path.exists() {
        debug!("No transfer mapping in {}", dir.display());
        return Ok(None);
    }
    let doc: TransferFile = read_document(&path)?;
    let t = doc.transfer_map.to_matrix("transfMap")?;
    info!("Loaded transfer mapping {}x{}", t.nrows(), t.ncols());
    Ok(Some(t))
}

/// Load an echo state network. A transfer mapping, if present, is folded
/// into the input weights so the network consumes untransformed features.
///
/// # Errors
///
/// [`ModelError::MissingResource`] names the first missing file; any other
/// variant describes a malformed or inconsistent document.
pub fn load_reservoir(dir: &Path) -> ModelResult<ReservoirNetwork> {
    let reservoir_path = dir.join(RESERVOIR_FILE);
    let output_path = dir.join(OUTPUT_WEIGHTS_FILE);
    for path in [&reservoir_path, &output_path] {
        if !path.exists() {
            return Err(ModelError::MissingResource { path: path.clone() });
        }
    }

    let reservoir: ReservoirFile = read_document(&reservoir_path)?;
    let output: OutputFile = read_document(&output_path)?;
    let (res, out) = (reservoir.esn, output.esn);
    res.check_update_rule()?;

    let mut w_in = res.w_inp.to_matrix("wInp")?;
    let neurons = w_in.nrows();
    // Reservoir is square over the neurons fed by wInp
    for declared in res.w_res.size {
        if declared != neurons {
            return Err(ProcessingError::mismatch("reservoir size vs input weight rows", neurons, declared).into());
        }
    }
    let w_res = res.w_res.to_matrix("wRes")?;
    if let Some(t) = load_transfer(dir)? {
        w_in = fold_transfer(&w_in, &t)?;
    }
    let w_out = out.w_out.to_matrix("wOut")?;
    let input_scaling = scaling_from("inpRange", &res.inp_offset, &res.inp_range)?;
    let output_scaling = out.scaling(w_out.nrows())?;

    let esn = ReservoirNetwork::new(w_in, w_res, w_out, res.dt, input_scaling, output_scaling)?;
    info!(
        "Loaded echo state network: {} inputs, {} neurons, {} outputs, dt={}",
        esn.num_inputs(),
        esn.num_neurons(),
        esn.num_outputs(),
        esn.dt()
    );
    Ok(esn)
}

/// GMLVQ models with the transfer mapping to apply to features first
#[derive(Clone, Debug)]
pub struct GmlvqModels {
    /// Models in file order
    pub models: Vec<PrototypeClassifier>,
    /// `features' = T · features` before classification
    pub transfer: Option<DMatrix<f64>>,
}

impl GmlvqModels {
    /// Length of the feature vector the models expect before any transfer
    /// mapping
    #[must_use]
    pub fn input_dimension(&self) -> Option<usize> {
        match &self.transfer {
            Some(t) => Some(t.ncols()),
            None => self.models.first().map(PrototypeClassifier::dimension),
        }
    }
}

/// Load every GMLVQ model in `dir`.
///
/// # Errors
///
/// - [`ModelError::MissingResource`] if `gmlvq_model.json` is absent
/// - [`ModelError::Processing`] if the transfer mapping output does not match
///   a model's dimension
/// - any other variant for a malformed document
pub fn load_gmlvq(dir: &Path) -> ModelResult<GmlvqModels> {
    let transfer = load_transfer(dir)?;
    let file: GmlvqFile = read_document(&dir.join(GMLVQ_FILE))?;

    let models = file
        .gmlvq
        .documents()?
        .into_iter()
        .map(|doc| doc.to_classifier())
        .collect::<ModelResult<Vec<_>>>()?;

    if let Some(t) = &transfer {
        if let Some(model) = models.iter().find(|m| m.dimension() != t.nrows()) {
            return Err(ProcessingError::mismatch("transfer mapping rows", model.dimension(), t.nrows()).into());
        }
    }
    for (i, m) in models.iter().enumerate() {
        info!("Loaded GMLVQ model {i}: {} prototypes in {} dimensions", m.num_prototypes(), m.dimension());
    }
    Ok(GmlvqModels { models, transfer })
}
