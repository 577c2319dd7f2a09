use std::fs;
use std::path::Path;

use log::warn;

use crate::calendar::Date;
use crate::calibration::ParamKind;
use crate::error::InputError;
use crate::model::WaterBalanceModel;
use crate::variable::Var;

fn load_lines(path: &Path) -> Result<Vec<String>, InputError> {
    let content = fs::read_to_string(path)
        .map_err(|_| InputError::CannotOpen(path.display().to_string()))?;
    Ok(content.lines().map(|line| line.to_string()).collect())
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Parse the initial-date line: one, two or three integers, optionally
/// followed by the catchment area. A lone year starts the hydrological year.
fn parse_date_line(line: &str, file_name: &str) -> Result<(Date, Option<f64>), InputError> {
    let mut tokens: Vec<&str> = line.split_whitespace().take(4).collect();
    if tokens.is_empty() {
        return Err(InputError::InvalidDateFormat(file_name.to_string()));
    }

    let mut area = None;
    let last = tokens[tokens.len() - 1];
    if tokens.len() == 4 || last.contains('.') {
        area = Some(
            last.parse::<f64>()
                .map_err(|_| InputError::MalformedHeader(file_name.to_string()))?,
        );
        tokens.pop();
    }

    let numbers: Vec<i64> = tokens
        .iter()
        .map(|t| t.parse::<i64>())
        .collect::<Result<_, _>>()
        .map_err(|_| InputError::MalformedHeader(file_name.to_string()))?;

    let date = match numbers[..] {
        [year] => Date::new(year as i32 - 1, 11, 1),
        [year, month] => Date::new(year as i32, month as u32, 1),
        [year, month, day] => Date::new(year as i32, month as u32, day as u32),
        _ => return Err(InputError::InvalidDateFormat(file_name.to_string())),
    };
    date.map(|date| (date, area))
        .map_err(|e| InputError::InvalidDate(file_name.to_string(), e))
}

impl WaterBalanceModel {
    /// Read the observed series from a whitespace-separated text file.
    ///
    /// Columns are assigned positionally from `input_vars`. Two dialects are
    /// recognised: the current one with a single initial-date header line
    /// (optionally carrying the catchment area), and the old one with a row
    /// count, a column count and the date line. Blank lines are skipped with
    /// a warning; extra columns are ignored with a warning.
    pub fn read_file<P: AsRef<Path>>(&mut self, path: P, input_vars: &[Var]) -> Result<(), InputError> {
        let path = path.as_ref();
        let file_name = path.display().to_string();
        let lines = load_lines(path)?;
        if lines.len() < 2 {
            return Err(InputError::MalformedHeader(file_name));
        }

        let old_style = lines[1].split_whitespace().count() == 1;
        if old_style {
            warn!("The input file '{file_name}' is old-style formatted");
        }
        let header_rows = if old_style { 3 } else { 1 };
        let data_lines: Vec<&String> = lines[header_rows.min(lines.len())..]
            .iter()
            .filter(|line| !is_blank(line))
            .collect();
        if data_lines.is_empty() {
            return Err(InputError::MalformedHeader(file_name));
        }
        let blank_count = lines.len().saturating_sub(header_rows) - data_lines.len();

        let ncol = data_lines[0].split_whitespace().count();
        if input_vars.len() > ncol {
            return Err(InputError::TooFewColumns(file_name, ncol, input_vars.len()));
        } else if input_vars.len() < ncol {
            warn!(
                "The input file '{file_name}' contains more columns than input variables, \
                 some columns will be omitted"
            );
        }
        for (position, var) in input_vars.iter().enumerate() {
            if input_vars[position + 1..].contains(var) {
                warn!(
                    "File '{}': Variable {} is set for more columns, only the last one will be used",
                    file_name,
                    var.name(self.model_type())
                );
            }
        }

        if old_style {
            let header_nrow = lines[0].trim().parse::<usize>().ok();
            let header_ncol = lines[1].trim().parse::<usize>().ok();
            if header_nrow != Some(data_lines.len()) {
                warn!(
                    "File '{}': Number of rows ({}) does not equal to number in header ({:?})",
                    file_name,
                    data_lines.len(),
                    header_nrow
                );
            }
            if header_ncol != Some(ncol) {
                warn!(
                    "File '{file_name}': Number of columns ({ncol}) does not equal to number \
                     in header ({header_ncol:?})"
                );
            }
        }

        let date_line = if old_style { &lines[2] } else { &lines[0] };
        let (initial_date, area) = parse_date_line(date_line, &file_name)?;

        if input_vars.iter().any(|var| var.is_water_use()) {
            self.set_water_use(true);
        }
        self.init_var(data_lines.len());
        self.set_calendar(initial_date);
        if let Some(area) = area {
            self.set_area(area);
        }

        for (row, line) in data_lines.iter().enumerate() {
            let mut tokens = line.split_whitespace();
            for var in input_vars {
                let value: f64 = tokens
                    .next()
                    .and_then(|token| token.parse().ok())
                    .ok_or_else(|| {
                        InputError::IncompleteLine(file_name.clone(), (*line).clone())
                    })?;
                self.var[(row, *var)] = value;
            }
        }
        for var in input_vars {
            self.var_is_input[var.index()] = true;
        }

        if blank_count > 0 {
            warn!("File '{file_name}': {blank_count} blank lines skipped");
        }
        Ok(())
    }

    /// Reload the parameter values from a previously written output file.
    ///
    /// Both the current layout and the legacy one are recognised by probing
    /// fixed header offsets. The values become both the initial and the
    /// current parameter values.
    pub fn read_params_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), InputError> {
        let path = path.as_ref();
        let file_name = path.display().to_string();
        let lines = load_lines(path)?;

        const LEGACY_TITLE: &str = "Resulting parameters of the model";
        const LEGACY_PARAMS: usize = 8;
        let legacy = lines
            .get(14)
            .map(|line| line.trim_start_matches('"').starts_with(LEGACY_TITLE))
            .unwrap_or(false);

        let mut pairs: Vec<(String, f64)> = vec![];
        if legacy {
            let names_line = lines
                .get(15)
                .ok_or_else(|| InputError::MalformedHeader(file_name.clone()))?
                .replace(',', " ");
            let values_line = lines
                .get(16)
                .ok_or_else(|| InputError::MalformedHeader(file_name.clone()))?
                .replace(',', " ");

            let names: Vec<String> = names_line
                .split_whitespace()
                .take(LEGACY_PARAMS)
                .map(|token| token.trim_matches('"').to_string())
                .collect();
            let values: Vec<f64> = values_line
                .split_whitespace()
                .take(LEGACY_PARAMS)
                .map(|token| token.parse::<f64>())
                .collect::<Result<_, _>>()
                .map_err(|_| InputError::MalformedHeader(file_name.clone()))?;
            if names.len() != LEGACY_PARAMS || values.len() != LEGACY_PARAMS {
                return Err(InputError::MalformedHeader(file_name));
            }
            for (name, value) in names.into_iter().zip(values) {
                // legacy daily outputs carried the monthly-only parameters too
                if self.params().len() == 6 && (name == "Dgw" || name == "Wic") {
                    continue;
                }
                pairs.push((name, value));
            }
        } else {
            let par_count = self.params().len();
            let ok_line = lines
                .get(par_count + 4)
                .ok_or_else(|| InputError::ParameterMismatch(file_name.clone()))?;
            if !ok_line.starts_with("OK\t") {
                return Err(InputError::ParameterMismatch(file_name));
            }
            for line in &lines[3..3 + par_count] {
                let mut tokens = line.split_whitespace();
                let name = tokens
                    .next()
                    .ok_or_else(|| InputError::MalformedHeader(file_name.clone()))?;
                let value: f64 = tokens
                    .next()
                    .and_then(|token| token.parse().ok())
                    .ok_or_else(|| InputError::MalformedHeader(file_name.clone()))?;
                pairs.push((name.to_string(), value));
            }
        }

        let pairs: Vec<(&str, f64)> = pairs.iter().map(|(n, v)| (n.as_str(), *v)).collect();
        self.set_params(&pairs, ParamKind::Init);
        self.set_params(&pairs, ParamKind::Curr);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use super::*;
    use crate::model::ModelType;

    fn temp_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("hydrobal_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_read_current_dialect_with_area() {
        let path = temp_file("current.txt");
        fs::write(
            &path,
            "1990 11 15 25.5\n1.0 2.0 3.0\n4.0 5.0 6.0\n7.0 8.0 9.0\n",
        )
        .unwrap();

        let mut model = WaterBalanceModel::new(ModelType::Daily);
        model.read_file(&path, &[Var::P, Var::T, Var::Pet]).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(model.time_steps(), 3);
        assert_eq!(model.initial_date().unwrap(), Date::new(1990, 11, 15).unwrap());
        assert_eq!(model.area(), 25.5);
        assert_eq!(model.series(Var::P), vec![1.0, 4.0, 7.0]);
        assert_eq!(model.series(Var::T), vec![2.0, 5.0, 8.0]);
        assert!(model.is_input(Var::Pet));
        assert!(!model.is_input(Var::R));
    }

    #[test]
    fn test_read_lone_year_starts_hydrological_year() {
        let path = temp_file("hydro_year.txt");
        fs::write(&path, "1991\n1.0 2.0\n3.0 4.0\n").unwrap();

        let mut model = WaterBalanceModel::new(ModelType::Monthly);
        model.read_file(&path, &[Var::P, Var::T]).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(model.initial_date().unwrap(), Date::new(1990, 11, 1).unwrap());
        // no decimal point and only one token, so no area was read
        assert_eq!(model.area(), 0.0);
    }

    #[test]
    fn test_read_old_style_dialect() {
        let path = temp_file("old_style.txt");
        fs::write(&path, "4\n2\n1990 2\n1 2\n3 4\n5 6\n7 8\n").unwrap();

        let mut model = WaterBalanceModel::new(ModelType::Monthly);
        model.read_file(&path, &[Var::P, Var::T]).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(model.time_steps(), 4);
        assert_eq!(model.initial_date().unwrap(), Date::new(1990, 2, 1).unwrap());
        assert_eq!(model.series(Var::P), vec![1.0, 3.0, 5.0, 7.0]);
        let months: Vec<u32> = (0..4).map(|ts| model.calen[ts].month).collect();
        assert_eq!(months, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let path = temp_file("blanks.txt");
        fs::write(&path, "1990 1 1\n1.0 2.0\n\n3.0 4.0\n   \n").unwrap();

        let mut model = WaterBalanceModel::new(ModelType::Daily);
        model.read_file(&path, &[Var::P, Var::T]).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(model.time_steps(), 2);
        assert_eq!(model.series(Var::P), vec![1.0, 3.0]);
    }

    #[test]
    fn test_incomplete_line_fails() {
        let path = temp_file("incomplete.txt");
        fs::write(&path, "1990 1 1\n1.0 2.0\n3.0\n").unwrap();

        let mut model = WaterBalanceModel::new(ModelType::Daily);
        let result = model.read_file(&path, &[Var::P, Var::T]);
        fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(InputError::IncompleteLine(_, _))));
    }

    #[test]
    fn test_too_few_columns_fails() {
        let path = temp_file("narrow.txt");
        fs::write(&path, "1990 1 1\n1.0\n2.0\n").unwrap();

        let mut model = WaterBalanceModel::new(ModelType::Daily);
        let result = model.read_file(&path, &[Var::P, Var::T]);
        fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(InputError::TooFewColumns(_, 1, 2))));
    }

    #[test]
    fn test_water_use_columns_enable_water_use() {
        let path = temp_file("water_use.txt");
        fs::write(&path, "1990 1 1\n1.0 2.0 3.0 0.1\n1.0 2.0 3.0 0.1\n").unwrap();

        let mut model = WaterBalanceModel::new(ModelType::Monthly);
        model
            .read_file(&path, &[Var::P, Var::T, Var::Pet, Var::Pod])
            .unwrap();
        fs::remove_file(&path).unwrap();
        assert!(model.water_use());
        assert!(model.is_input(Var::Pod));
    }

    #[test]
    fn test_read_params_current_dialect() {
        let path = temp_file("params.txt");
        fs::write(
            &path,
            "Initial\n1990-11-1\n\nSpa\t150.5\nAlf\t0.45\nDgm\t3.25\nSoc\t0.2\nMec\t0.01\nGrd\t0.04\n\nOK\t0.00125\n",
        )
        .unwrap();

        let mut model = WaterBalanceModel::new(ModelType::Daily);
        model.read_params_file(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(model.params()[0].value, 150.5);
        assert_eq!(model.params()[0].initial, 150.5);
        assert_eq!(model.params()[5].value, 0.04);
    }

    #[test]
    fn test_read_params_wrong_model_type() {
        let path = temp_file("params_monthly.txt");
        fs::write(
            &path,
            "Initial\n1990-11-1\n\nSpa\t147.7\nDgw\t13.8\nAlf\t0.000779\nDgm\t15.22\nSoc\t0.699\nWic\t0.342\nMec\t0.799\nGrd\t0.499\n\nOK\t0.5\n",
        )
        .unwrap();

        let mut model = WaterBalanceModel::new(ModelType::Daily);
        let result = model.read_params_file(&path);
        fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(InputError::ParameterMismatch(_))));
    }

    #[test]
    fn test_read_params_legacy_dialect() {
        let mut content = String::new();
        for _ in 0..14 {
            content.push('\n');
        }
        content.push_str("\"Resulting parameters of the model\"\n");
        content.push_str("\"Spa\",\"Dgw\",\"Alf\",\"Dgm\",\"Soc\",\"Wic\",\"Mec\",\"Grd\"\n");
        content.push_str("120.0,10.0,0.5,4.0,0.25,0.3,0.02,0.06\n");

        let path = temp_file("params_legacy.txt");
        fs::write(&path, content).unwrap();

        let mut model = WaterBalanceModel::new(ModelType::Daily);
        model.read_params_file(&path).unwrap();
        fs::remove_file(&path).unwrap();

        // Dgw and Wic have no meaning for the daily model and were dropped
        assert_eq!(model.params()[0].value, 120.0);
        assert_eq!(model.params()[1].value, 0.5);
        assert_eq!(model.params()[2].value, 4.0);
        assert_eq!(model.params()[5].value, 0.06);
    }
}
