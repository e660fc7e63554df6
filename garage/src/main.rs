use anyhow::Context;
use futures::future::LocalBoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use garage::animation::AnimationOutcome;
use garage::api::ApiClient;
use garage::config::{
    init_tracing, Config, GARAGE_PAGE_SIZE, GENERATE_BATCH, RENDER_TICK, WHEEL_TICK,
    WINNERS_PAGE_SIZE,
};
use garage::garage::{
    car_form, generate_random_cars, load_garage, load_winners, remove_car, GarageState,
    WinnersState,
};
use garage::race::{RaceOrchestrator, RaceSummary};
use garage::shell::{parse_command, Command, HELP};
use garage::terminal::{paint, render_wheel, wheel_frame, TrackVisual};
use garage::wheel::{FileStore, WheelRepository, WheelSpinner};
use shared::fsm::RaceState;
use shared::protocol::{page_count, Car, CarId, Page};
use shared::router::{History, Route};
use shared::timing::format_time;
use shared::wheel::{
    parse_options_json, parse_pasted, parse_weight, OptionList, WheelError, WheelOption,
    WheelState, DEFAULT_WEIGHT,
};
use std::io::Write;
use std::rc::Rc;
use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tokio::time::interval;
use tracing::{debug, info};

type Orchestrator = RaceOrchestrator<ApiClient, TrackVisual>;

enum Effect {
    Nothing,
    Race,
    Reset,
    RunCar(CarId),
    Spin,
    Quit,
}

struct App {
    api: ApiClient,
    track_width: u16,
    history: History,
    garage: GarageState,
    cars: Page<Car>,
    winners: WinnersState,
    winners_total: usize,
    wheel: WheelRepository<FileStore>,
    options: OptionList,
    spinner: Option<Rc<WheelSpinner>>,
}

impl App {
    fn new(api: ApiClient, config: &Config) -> anyhow::Result<Self> {
        let wheel = WheelRepository::new(FileStore::open(&config.wheel_store)?);
        let options = wheel.load_options();
        Ok(Self {
            api,
            track_width: config.track_width,
            history: History::default(),
            garage: GarageState::default(),
            cars: Page::empty(),
            winners: WinnersState::default(),
            winners_total: 0,
            wheel,
            options,
            spinner: None,
        })
    }

    fn route(&self) -> Route {
        self.history.current().clone()
    }

    fn is_spinning(&self) -> bool {
        self.spinner
            .as_ref()
            .is_some_and(|s| s.state() == WheelState::Picking)
    }

    async fn handle(&mut self, race: &Orchestrator, command: Command) -> anyhow::Result<Effect> {
        let route = self.route();
        match command {
            Command::Quit => return Ok(Effect::Quit),
            Command::Help => println!("{}", HELP),
            Command::Show => self.show(race).await,
            Command::Goto(path) => {
                if !self.spin_locked() {
                    self.history.navigate(&path);
                    self.enter(race).await?;
                }
            }
            Command::Back => {
                if !self.spin_locked() && self.history.back().is_some() {
                    self.enter(race).await?;
                }
            }
            Command::Forward => {
                if !self.spin_locked() && self.history.forward().is_some() {
                    self.enter(race).await?;
                }
            }

            Command::Create { color, name } => {
                if race_locked(race) {
                    return Ok(Effect::Nothing);
                }
                let Some(car) = car_form(&name, &color) else {
                    println!("A car needs a name and a #rrggbb colour");
                    return Ok(Effect::Nothing);
                };
                let created = self.api.create_car(&car).await?;
                println!("Created {} {}", created.id, created.name);
                self.garage.reset_create_form();
                self.refresh_garage(race).await;
            }
            Command::Select(id) => {
                let found = match self.cars.items.iter().find(|c| c.id == id) {
                    Some(car) => Some(car.clone()),
                    None => self.api.get_car(id).await,
                };
                match found {
                    Some(car) => {
                        self.garage.select(&car);
                        println!("Selected {} {}", car.id, car.name);
                    }
                    None => println!("No car {}", id),
                }
            }
            Command::Update { color, name } => {
                if race_locked(race) {
                    return Ok(Effect::Nothing);
                }
                let Some(id) = self.garage.selected else {
                    println!("Select a car first");
                    return Ok(Effect::Nothing);
                };
                let Some(car) = car_form(&name, &color) else {
                    println!("A car needs a name and a #rrggbb colour");
                    return Ok(Effect::Nothing);
                };
                self.api.update_car(id, &car).await?;
                self.garage.clear_selection();
                self.refresh_garage(race).await;
            }
            Command::Delete(id) => {
                if race_locked(race) {
                    return Ok(Effect::Nothing);
                }
                remove_car(&self.api, id).await?;
                if self.garage.selected == Some(id) {
                    self.garage.clear_selection();
                }
                self.refresh_garage(race).await;
            }
            Command::Generate(count) => {
                if race_locked(race) {
                    return Ok(Effect::Nothing);
                }
                let count = count.unwrap_or(GENERATE_BATCH);
                let created = generate_random_cars(&self.api, count).await;
                println!("Generated {} cars", created);
                self.refresh_garage(race).await;
            }
            Command::Next => self.turn_page(race, true).await,
            Command::Prev => self.turn_page(race, false).await,

            Command::Race => {
                if route != Route::Garage {
                    println!("Races run in the garage");
                } else if race.is_racing() {
                    println!("A race is already running");
                } else if race.state() == RaceState::Finished {
                    println!("Reset the cars before racing again");
                } else if race.is_empty() {
                    println!("No cars on this page");
                } else {
                    return Ok(Effect::Race);
                }
            }
            Command::Reset => {
                if route == Route::Garage {
                    return Ok(Effect::Reset);
                }
                println!("Races run in the garage");
            }
            Command::StartCar(id) => {
                if race.is_racing() {
                    println!("Wait for the race to finish or reset it");
                } else if !race.entries().iter().any(|(car, _, _)| *car == id) {
                    println!("Car {} is not on this page", id);
                } else {
                    return Ok(Effect::RunCar(id));
                }
            }
            Command::StopCar(id) => {
                if !race.reset_car(id).await {
                    println!("Car {} is not on this page", id);
                }
            }
            Command::Sort(field) => {
                if route == Route::Winners {
                    self.winners.sort_by(field);
                    self.show(race).await;
                } else {
                    println!("Sorting applies to the winners table");
                }
            }

            Command::AddOption { text, weight } => {
                if self.spin_locked() {
                    return Ok(Effect::Nothing);
                }
                let weight = weight.as_deref().map(parse_weight).unwrap_or(DEFAULT_WEIGHT);
                self.options.add(text, weight);
                self.options_changed(race).await?;
            }
            Command::SetText { id, text } => {
                if self.spin_locked() {
                    return Ok(Effect::Nothing);
                }
                if self.options.set_text(id, text) {
                    self.options_changed(race).await?;
                } else {
                    println!("No option #{}", id);
                }
            }
            Command::SetWeight { id, weight } => {
                if self.spin_locked() {
                    return Ok(Effect::Nothing);
                }
                if self.options.set_weight(id, parse_weight(&weight)) {
                    self.options_changed(race).await?;
                } else {
                    println!("No option #{}", id);
                }
            }
            Command::RemoveOption(id) => {
                if self.spin_locked() {
                    return Ok(Effect::Nothing);
                }
                if self.options.remove(id) {
                    self.options_changed(race).await?;
                } else {
                    println!("No option #{}", id);
                }
            }
            Command::ClearOptions => {
                if self.spin_locked() {
                    return Ok(Effect::Nothing);
                }
                self.options.clear();
                self.options_changed(race).await?;
            }
            Command::Paste(path) => {
                if self.spin_locked() {
                    return Ok(Effect::Nothing);
                }
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let entries = parse_pasted(&text);
                if entries.is_empty() {
                    println!("No `text,weight` lines found in {}", path.display());
                    return Ok(Effect::Nothing);
                }
                self.options.replace_with_entries(entries);
                self.options_changed(race).await?;
            }
            Command::Export(path) => {
                std::fs::write(&path, self.options.to_json()?)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Saved {} options to {}", self.options.len(), path.display());
            }
            Command::Import(path) => {
                if self.spin_locked() {
                    return Ok(Effect::Nothing);
                }
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let options = parse_options_json(&text)?;
                self.options.replace(options);
                self.options_changed(race).await?;
            }

            Command::Spin => match &self.spinner {
                Some(spinner) if spinner.state() != WheelState::Picking => return Ok(Effect::Spin),
                Some(_) => println!("The wheel is already spinning"),
                None => println!("Open the wheel first: goto /wheel"),
            },
            Command::Duration(seconds) => {
                let Some(spinner) = &self.spinner else {
                    println!("Open the wheel first: goto /wheel");
                    return Ok(Effect::Nothing);
                };
                let seconds = seconds.trim().parse::<f64>().unwrap_or(f64::NAN);
                let duration = spinner.set_duration(seconds)?;
                self.wheel.set_rotation_duration(seconds)?;
                println!("Spin duration {}s", duration.as_secs_f64());
            }
            Command::Mute => {
                let Some(spinner) = &self.spinner else {
                    println!("Open the wheel first: goto /wheel");
                    return Ok(Effect::Nothing);
                };
                let muted = spinner.toggle_mute()?;
                self.wheel.set_muted(muted)?;
                println!("Sound {}", if muted { "off" } else { "on" });
            }
        }
        Ok(Effect::Nothing)
    }

    async fn turn_page(&mut self, race: &Orchestrator, forward: bool) {
        match self.route() {
            Route::Garage => {
                if race_locked(race) {
                    return;
                }
                let total = self.cars.total_count;
                let moved = if forward {
                    self.garage.next_page(total)
                } else {
                    self.garage.prev_page(total)
                };
                if moved {
                    self.refresh_garage(race).await;
                }
            }
            Route::Winners => {
                let total = self.winners_total;
                let moved = if forward {
                    self.winners.next_page(total)
                } else {
                    self.winners.prev_page(total)
                };
                if moved {
                    self.show(race).await;
                }
            }
            _ => println!("Nothing to page through here"),
        }
    }

    fn spin_locked(&self) -> bool {
        let locked = self.is_spinning();
        if locked {
            println!("Wait for the wheel to stop");
        }
        locked
    }

    /// Renders the page the history points at, redirecting away from a
    /// wheel that could not be spun.
    async fn enter(&mut self, race: &Orchestrator) -> anyhow::Result<()> {
        let route = self.route();
        if route != Route::Wheel {
            self.spinner = None;
        }
        match route {
            Route::Garage => self.refresh_garage(race).await,
            Route::Wheel => {
                if !self.options.can_spin() {
                    println!("{}", WheelError::NotEnoughOptions);
                    self.spinner = None;
                    self.history.navigate(Route::Garage.path());
                    self.refresh_garage(race).await;
                    return Ok(());
                }
                let spinner = WheelSpinner::prepare(
                    &self.options,
                    self.wheel.is_muted(),
                    self.wheel.rotation_duration(),
                    &mut rand::thread_rng(),
                )?;
                self.spinner = Some(Rc::new(spinner));
                self.show(race).await;
            }
            _ => self.show(race).await,
        }
        Ok(())
    }

    async fn options_changed(&mut self, race: &Orchestrator) -> anyhow::Result<()> {
        self.wheel.save_options(&self.options)?;
        print_options(&self.options);
        if self.route() == Route::Wheel {
            self.enter(race).await?;
        }
        Ok(())
    }

    /// Reloads the current garage page and registers its cars for racing.
    /// Leaves the track alone while a race is running.
    async fn refresh_garage(&mut self, race: &Orchestrator) {
        if race.is_racing() {
            self.render_garage(race);
            return;
        }
        let mut cars = load_garage(&self.api, &self.garage).await;
        if cars.items.is_empty() && self.garage.page > 1 {
            self.garage.clamp_page(cars.total_count);
            cars = load_garage(&self.api, &self.garage).await;
        }

        // a fresh set of cars starts from rest
        if race.state() == RaceState::Finished {
            race.reset().await;
        }
        race.clear();
        for car in &cars.items {
            let visual = TrackVisual::new(car.clone(), self.track_width);
            race.register(car.id, car.name.clone(), Rc::new(visual));
        }
        debug!("Registered {} cars from page {}", race.len(), self.garage.page);
        self.cars = cars;
        self.render_garage(race);
    }

    fn render_garage(&self, race: &Orchestrator) {
        println!(
            "Garage ({} cars)  page {}/{}  race {:?}",
            self.cars.total_count,
            self.garage.page,
            page_count(self.cars.total_count, GARAGE_PAGE_SIZE),
            race.state()
        );
        for (_, _, visual) in race.entries() {
            println!("{}", visual.render());
        }
        if let Some(id) = self.garage.selected {
            println!("selected: {} {}", id, self.garage.update_form.name);
        }
    }

    async fn show(&mut self, race: &Orchestrator) {
        match self.route() {
            Route::Garage => self.render_garage(race),
            Route::Winners => {
                let (rows, total) = load_winners(&self.api, &self.winners).await;
                self.winners_total = total;
                println!(
                    "Winners ({})  page {}/{}  sorted by {}",
                    total,
                    self.winners.page,
                    page_count(total, WINNERS_PAGE_SIZE),
                    self.winners.sort
                );
                println!("{:>4}  {:<3}  {:<20}  {:>4}  {:>9}", "No", "Car", "Name", "Wins", "Best (s)");
                for row in rows {
                    println!(
                        "{:>4}  {:<3}  {:<20.20}  {:>4}  {:>9}",
                        row.position,
                        paint(&row.car.color, '>'),
                        row.car.name,
                        row.wins,
                        format_time(row.time)
                    );
                }
            }
            Route::Wheel => {
                if let Some(spinner) = &self.spinner {
                    print!("{}", render_wheel(&spinner.options(), None));
                    println!(
                        "duration {}s  sound {}",
                        spinner.duration().as_secs_f64(),
                        if spinner.is_muted() { "off" } else { "on" }
                    );
                }
            }
            Route::NotFound(path) => println!("404: nothing at {}", path),
        }
    }
}

/// Garage mutations wait until the race is over.
fn race_locked(race: &Orchestrator) -> bool {
    let locked = race.is_racing();
    if locked {
        println!("Wait for the race to finish or reset it");
    }
    locked
}

fn print_options(options: &OptionList) {
    for option in options.options() {
        println!("#{:<3} {:<30} {}", option.id, option.text, option.weight);
    }
}

fn report_race(summary: Option<RaceSummary>) {
    let Some(summary) = summary else {
        return;
    };
    match &summary.winner {
        _ if summary.cancelled => {}
        None => println!("No car made it to the finish"),
        Some(winner) if !summary.recorded => println!(
            "{} won in {}s but the result could not be saved",
            winner.name,
            format_time(winner.time)
        ),
        Some(_) => {}
    }
}

fn report_car(id: CarId, outcome: Option<AnimationOutcome>) {
    match outcome {
        Some(AnimationOutcome::Finished { time }) => {
            println!("Car {} finished in {}s", id, format_time(time))
        }
        Some(AnimationOutcome::Failed) => println!("Car {} broke down", id),
        Some(AnimationOutcome::Cancelled) | None => {}
    }
}

fn report_pick(result: Result<WheelOption, WheelError>, muted: bool) {
    match result {
        Ok(option) => {
            println!("\nResult: {}", option.text);
            if !muted {
                // terminal bell
                print!("\x07");
            }
        }
        Err(e) => println!("\n{}", e),
    }
    let _ = std::io::stdout().flush();
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    init_tracing();
    info!("Using garage API at {}", config.api_url);

    let api = ApiClient::new(&config.api_url)?;
    let orchestrator: Orchestrator =
        RaceOrchestrator::new(api.clone()).with_winner_callback(|notice| println!("\n{}", notice));
    let race = &orchestrator;
    let mut app = App::new(api, &config)?;

    // reset cancels through the orchestrator; runs stay here until they settle
    let mut race_runs: FuturesUnordered<LocalBoxFuture<'_, Option<RaceSummary>>> =
        FuturesUnordered::new();
    let mut car_runs: FuturesUnordered<LocalBoxFuture<'_, (CarId, Option<AnimationOutcome>)>> =
        FuturesUnordered::new();
    let mut spin_run: Option<LocalBoxFuture<'static, Result<WheelOption, WheelError>>> = None;
    let mut ticker = interval(RENDER_TICK);
    let mut was_moving = false;
    let mut lines = BufReader::new(stdin()).lines();

    println!("{}", HELP);
    app.enter(race).await?;
    prompt();

    loop {
        tokio::select! {
            Some(summary) = race_runs.next(), if !race_runs.is_empty() => {
                report_race(summary);
                if app.route() == Route::Garage {
                    app.render_garage(race);
                }
                prompt();
            }

            Some((id, outcome)) = car_runs.next(), if !car_runs.is_empty() => {
                report_car(id, outcome);
                prompt();
            }

            result = async {
                if let Some(run) = spin_run.as_mut() {
                    run.await
                } else {
                    std::future::pending().await
                }
            } => {
                spin_run = None;
                let muted = app.spinner.as_ref().is_some_and(|s| s.is_muted());
                report_pick(result, muted);
                prompt();
            }

            _ = ticker.tick() => {
                if app.route() != Route::Garage {
                    continue;
                }
                let moving = race.entries().iter().any(|(_, _, v)| v.is_moving());
                if moving || was_moving {
                    print!("\x1b[2J\x1b[H");
                    app.render_garage(race);
                    prompt();
                }
                was_moving = moving;
            }

            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let Some(parsed) = parse_command(&line) else {
                    prompt();
                    continue;
                };
                let command = match parsed {
                    Ok(command) => command,
                    Err(e) => {
                        println!("{}", e);
                        prompt();
                        continue;
                    }
                };
                match app.handle(race, command).await {
                    Ok(Effect::Nothing) => {}
                    Ok(Effect::Quit) => break,
                    Ok(Effect::Race) => race_runs.push(race.start().boxed_local()),
                    Ok(Effect::Reset) => {
                        race.reset().await;
                        app.render_garage(race);
                    }
                    Ok(Effect::RunCar(id)) => {
                        car_runs.push(async move { (id, race.start_car(id).await) }.boxed_local());
                    }
                    Ok(Effect::Spin) => {
                        if let Some(spinner) = app.spinner.clone() {
                            let plan = spinner.plan(&mut rand::thread_rng());
                            let options = spinner.options();
                            spin_run = Some(
                                async move {
                                    spinner
                                        .spin(plan, WHEEL_TICK, |option| {
                                            print!("{}", wheel_frame(&options, option));
                                            let _ = std::io::stdout().flush();
                                        })
                                        .await
                                }
                                .boxed_local(),
                            );
                        }
                    }
                    Err(e) => println!("{:#}", e),
                }
                prompt();
            }
        }
    }

    info!("Shutting down");
    race.reset().await;
    Ok(())
}
