use crate::error::{KeeperError, Result};
use crate::events::{HostNotification, Maximized, Rect, WindowId};
use crate::keeper_error;
use std::collections::HashMap;
use std::process::{Command, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::r#trait::{HostWindow, NotificationSource, WindowHandle, WindowHost};

/// Свойства корневого окна, за которыми следит `xprop -spy`
const SPY_PROPERTIES: [&str; 4] = [
    "_NET_CLIENT_LIST",
    "_NET_CLIENT_LIST_STACKING",
    "_NET_ACTIVE_WINDOW",
    "_NET_DESKTOP_GEOMETRY",
];

/// Хост поверх EWMH-совместимого оконного менеджера X11.
///
/// Работает через утилиты `wmctrl`, `xdotool` и `xprop`. Перемещение,
/// сворачивание и полноэкранный режим не меняют свойств корневого окна,
/// поэтому источник уведомлений дополнительно сравнивает список окон
/// с интервалом `watch_interval`.
pub struct X11Host {
    watch_interval: Duration,
}

impl X11Host {
    pub fn new(watch_interval: Duration) -> Result<Self> {
        info!("Инициализация X11Host");
        if std::env::var("DISPLAY").is_err() {
            return Err(keeper_error!(service_unavailable, "переменная DISPLAY не задана"));
        }
        for tool in ["wmctrl", "xdotool", "xprop"] {
            test_tool(tool)?;
        }
        if test_tool("xrandr").is_err() {
            warn!("xrandr не найден, переходы окон между мониторами отслеживаться не будут");
        }
        Ok(Self { watch_interval })
    }
}

impl WindowHost for X11Host {
    fn name(&self) -> &'static str {
        "x11"
    }

    fn windows(&mut self) -> Result<Vec<WindowHandle>> {
        let listing = run_tool("wmctrl", &["-l", "-G"])?;
        let mut windows: Vec<WindowHandle> = Vec::new();

        for entry in parse_wmctrl_list(&listing) {
            let state = match query_wm_state(entry.id) {
                Ok(state) => state,
                Err(e) => {
                    // Окно могло закрыться между вызовами
                    debug!("Не удалось прочитать _NET_WM_STATE для {}: {}", entry.id, e);
                    continue;
                }
            };
            if state.skip_taskbar {
                continue;
            }
            windows.push(Box::new(X11Window { entry, state }));
        }

        Ok(windows)
    }

    fn display_size(&self) -> Result<(u32, u32)> {
        let output = run_tool("xdotool", &["getdisplaygeometry"])?;
        parse_display_geometry(&output)
            .ok_or_else(|| keeper_error!(host, "неожиданный вывод xdotool getdisplaygeometry: {}", output.trim()))
    }

    fn subscribe(&self) -> Result<Box<dyn NotificationSource + Send>> {
        Ok(Box::new(XpropSpySource {
            watch_interval: self.watch_interval,
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct WmctrlEntry {
    id: WindowId,
    desktop: Option<u32>,
    rect: Rect,
    title: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct NetWmState {
    maximized_horz: bool,
    maximized_vert: bool,
    hidden: bool,
    fullscreen: bool,
    skip_taskbar: bool,
}

struct X11Window {
    entry: WmctrlEntry,
    state: NetWmState,
}

impl X11Window {
    fn id_arg(&self) -> String {
        format!("{:#x}", self.entry.id.value())
    }

    fn wmctrl(&self, args: &[&str]) -> Result<()> {
        let id = self.id_arg();
        let mut full = vec!["-i", "-r", id.as_str()];
        full.extend_from_slice(args);
        run_tool("wmctrl", &full).map(|_| ())
    }

    fn set_maximized(&mut self, action: &str, flags: Maximized) -> Result<()> {
        let mut properties = vec![action];
        if flags.horizontal() {
            properties.push("maximized_horz");
        }
        if flags.vertical() {
            properties.push("maximized_vert");
        }
        if properties.len() == 1 {
            return Ok(());
        }
        self.wmctrl(&["-b", &properties.join(",")])
    }
}

impl HostWindow for X11Window {
    fn id(&self) -> WindowId {
        self.entry.id
    }

    fn frame_rect(&self) -> Rect {
        self.entry.rect
    }

    fn maximized(&self) -> Maximized {
        Maximized::from_axes(self.state.maximized_horz, self.state.maximized_vert)
    }

    fn is_minimized(&self) -> bool {
        self.state.hidden
    }

    fn workspace(&self) -> Option<u32> {
        self.entry.desktop
    }

    fn is_fullscreen(&self) -> bool {
        self.state.fullscreen
    }

    fn title(&self) -> String {
        self.entry.title.clone()
    }

    fn move_resize_frame(&mut self, _user_op: bool, rect: Rect) -> Result<()> {
        let geometry = format!("0,{},{},{},{}", rect.x, rect.y, rect.width, rect.height);
        self.wmctrl(&["-e", &geometry])?;
        // Максимизированное окно геометрию игнорирует
        if !self.maximized().is_maximized() {
            self.entry.rect = rect;
        }
        Ok(())
    }

    fn maximize(&mut self, flags: Maximized) -> Result<()> {
        self.set_maximized("add", flags)?;
        self.state.maximized_horz |= flags.horizontal();
        self.state.maximized_vert |= flags.vertical();
        Ok(())
    }

    fn unmaximize(&mut self, flags: Maximized) -> Result<()> {
        self.set_maximized("remove", flags)?;
        self.state.maximized_horz &= !flags.horizontal();
        self.state.maximized_vert &= !flags.vertical();
        Ok(())
    }

    fn minimize(&mut self) -> Result<()> {
        run_tool("xdotool", &["windowminimize", &self.id_arg()])?;
        self.state.hidden = true;
        Ok(())
    }

    fn unminimize(&mut self) -> Result<()> {
        run_tool("xdotool", &["windowactivate", &self.id_arg()])?;
        self.state.hidden = false;
        Ok(())
    }

    fn change_workspace(&mut self, index: u32, _user_op: bool) -> Result<()> {
        self.wmctrl(&["-t", &index.to_string()])?;
        self.entry.desktop = Some(index);
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        let listing = run_tool("wmctrl", &["-l", "-G"])?;
        let entry = parse_wmctrl_list(&listing)
            .into_iter()
            .find(|e| e.id == self.entry.id)
            .ok_or_else(|| keeper_error!(host, "окно {} больше не существует", self.entry.id))?;
        self.state = query_wm_state(entry.id)?;
        self.entry = entry;
        Ok(())
    }
}

/// Наблюдаемое состояние окна, по которому ищутся изменения
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ClientState {
    rect: Rect,
    hidden: bool,
    fullscreen: bool,
    monitor: Option<usize>,
}

type ClientMap = HashMap<WindowId, ClientState>;

/// Превращает строки `xprop -spy` и изменения списка окон в уведомления
struct XpropSpySource {
    watch_interval: Duration,
}

#[async_trait::async_trait]
impl NotificationSource for XpropSpySource {
    async fn run(self: Box<Self>, tx: mpsc::Sender<HostNotification>) -> Result<()> {
        info!(
            "Подписка на свойства корневого окна через xprop -spy, опрос окон каждые {:?}",
            self.watch_interval
        );

        let mut child = tokio::process::Command::new("xprop")
            .arg("-root")
            .arg("-spy")
            .args(SPY_PROPERTIES)
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| keeper_error!(internal, "stdout xprop недоступен"))?;
        let mut lines = BufReader::new(stdout).lines();

        let mut ticker = interval(self.watch_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut clients: Option<ClientMap> = None;

        loop {
            let notifications: Vec<HostNotification> = tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) => classify_xprop_line(&line).into_iter().collect(),
                    None => break,
                },
                _ = ticker.tick() => {
                    let current = match tokio::task::spawn_blocking(read_clients).await {
                        Ok(Ok(current)) => current,
                        Ok(Err(e)) => {
                            debug!("Не удалось опросить окна: {}", e);
                            continue;
                        }
                        Err(e) => return Err(keeper_error!(internal, "опрос окон прерван: {}", e)),
                    };
                    // Первый опрос только запоминает исходное состояние
                    let changes = clients
                        .as_ref()
                        .map(|previous| diff_clients(previous, &current))
                        .unwrap_or_default();
                    clients = Some(current);
                    changes
                }
            };

            for notification in notifications {
                if tx.send(notification).await.is_err() {
                    return Ok(());
                }
            }
        }

        warn!("xprop -spy завершился, уведомления больше не поступают");
        Err(keeper_error!(service_unavailable, "xprop -spy завершился"))
    }
}

fn test_tool(tool: &str) -> Result<()> {
    let output = Command::new("which").arg(tool).output()?;
    if output.status.success() {
        Ok(())
    } else {
        Err(keeper_error!(service_unavailable, "{} не найден", tool))
    }
}

fn run_tool(program: &str, args: &[&str]) -> Result<String> {
    debug!("Запуск {} {}", program, args.join(" "));
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| keeper_error!(host, "{} не найден: {}", program, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return KeeperError::host(format!("{} вернул ошибку: {}", program, stderr.trim()));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn read_clients() -> Result<ClientMap> {
    let monitors = query_monitors();
    let listing = run_tool("wmctrl", &["-l", "-G"])?;
    let mut clients = ClientMap::new();

    for entry in parse_wmctrl_list(&listing) {
        let Ok(state) = query_wm_state(entry.id) else {
            continue;
        };
        if state.skip_taskbar {
            continue;
        }
        clients.insert(
            entry.id,
            ClientState {
                rect: entry.rect,
                hidden: state.hidden,
                fullscreen: state.fullscreen,
                monitor: monitor_of(&entry.rect, &monitors),
            },
        );
    }

    Ok(clients)
}

fn query_monitors() -> Vec<Rect> {
    match run_tool("xrandr", &["--listmonitors"]) {
        Ok(output) => parse_xrandr_monitors(&output),
        Err(e) => {
            debug!("Список мониторов недоступен: {}", e);
            Vec::new()
        }
    }
}

fn query_wm_state(id: WindowId) -> Result<NetWmState> {
    let output = run_tool("xprop", &["-id", &format!("{:#x}", id.value()), "_NET_WM_STATE"])?;
    Ok(parse_net_wm_state(&output))
}

/// Разбор `wmctrl -l -G`: `<id> <desktop> <x> <y> <w> <h> <host> <title...>`
fn parse_wmctrl_list(output: &str) -> Vec<WmctrlEntry> {
    output
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 7 {
                return None;
            }
            let id = u64::from_str_radix(parts[0].trim_start_matches("0x"), 16).ok()?;
            let desktop: i64 = parts[1].parse().ok()?;
            let rect = Rect::new(
                parts[2].parse().ok()?,
                parts[3].parse().ok()?,
                parts[4].parse().ok()?,
                parts[5].parse().ok()?,
            );
            Some(WmctrlEntry {
                id: WindowId(id),
                // -1 означает «на всех рабочих столах»
                desktop: u32::try_from(desktop).ok(),
                rect,
                title: parts[7..].join(" "),
            })
        })
        .collect()
}

fn parse_net_wm_state(output: &str) -> NetWmState {
    let mut state = NetWmState::default();
    let Some((_, atoms)) = output.split_once('=') else {
        return state;
    };
    for atom in atoms.split(',').map(str::trim) {
        match atom {
            "_NET_WM_STATE_MAXIMIZED_HORZ" => state.maximized_horz = true,
            "_NET_WM_STATE_MAXIMIZED_VERT" => state.maximized_vert = true,
            "_NET_WM_STATE_HIDDEN" => state.hidden = true,
            "_NET_WM_STATE_FULLSCREEN" => state.fullscreen = true,
            "_NET_WM_STATE_SKIP_TASKBAR" => state.skip_taskbar = true,
            _ => {}
        }
    }
    state
}

fn parse_display_geometry(output: &str) -> Option<(u32, u32)> {
    let mut parts = output.split_whitespace();
    let width = parts.next()?.parse().ok()?;
    let height = parts.next()?.parse().ok()?;
    Some((width, height))
}

/// Разбор `xrandr --listmonitors`: ` 0: +*HDMI-1 1920/531x1080/299+0+0  HDMI-1`
fn parse_xrandr_monitors(output: &str) -> Vec<Rect> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let geometry = line.split_whitespace().nth(2)?;
            let mut parts = geometry.split('+');
            let (width, height) = parts.next()?.split_once('x')?;
            let width = width.split('/').next()?.parse().ok()?;
            let height = height.split('/').next()?.parse().ok()?;
            let x = parts.next()?.parse().ok()?;
            let y = parts.next()?.parse().ok()?;
            Some(Rect::new(x, y, width, height))
        })
        .collect()
}

/// Монитор, на котором находится центр окна
fn monitor_of(rect: &Rect, monitors: &[Rect]) -> Option<usize> {
    let cx = i64::from(rect.x) + i64::from(rect.width) / 2;
    let cy = i64::from(rect.y) + i64::from(rect.height) / 2;
    monitors.iter().position(|m| {
        let (left, top) = (i64::from(m.x), i64::from(m.y));
        (left..left + i64::from(m.width)).contains(&cx) && (top..top + i64::from(m.height)).contains(&cy)
    })
}

/// Уведомления о том, чем текущий список окон отличается от предыдущего
fn diff_clients(previous: &ClientMap, current: &ClientMap) -> Vec<HostNotification> {
    let mut ids: Vec<&WindowId> = current.keys().collect();
    ids.sort();

    let mut notifications = Vec::new();
    let mut push = |notification: HostNotification| {
        if !notifications.contains(&notification) {
            notifications.push(notification);
        }
    };

    for id in ids {
        let now = &current[id];
        let Some(before) = previous.get(id) else {
            push(HostNotification::WindowCreated);
            continue;
        };
        if before.hidden != now.hidden {
            push(if now.hidden {
                HostNotification::Minimize
            } else {
                HostNotification::Unminimize
            });
        }
        if before.fullscreen != now.fullscreen {
            push(HostNotification::InFullscreenChanged);
        }
        if before.monitor != now.monitor {
            push(HostNotification::WindowEnteredMonitor);
        } else if before.rect != now.rect {
            push(HostNotification::SizeChanged);
        }
    }

    notifications
}

fn classify_xprop_line(line: &str) -> Option<HostNotification> {
    let property = line.split(['(', ':', ' ']).next()?;
    match property {
        "_NET_CLIENT_LIST" => Some(HostNotification::WindowCreated),
        "_NET_CLIENT_LIST_STACKING" | "_NET_ACTIVE_WINDOW" => Some(HostNotification::GrabOpEnd),
        "_NET_DESKTOP_GEOMETRY" => Some(HostNotification::MonitorsChanged),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wmctrl_list() {
        let output = "0x03a00003  0 1920 0    1280 1024 myhost Firefox - Start Page\n\
                      0x01200007 -1 0    0    1920 32   myhost \n\
                      garbage line\n";
        let entries = parse_wmctrl_list(output);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, WindowId(0x03a00003));
        assert_eq!(entries[0].desktop, Some(0));
        assert_eq!(entries[0].rect, Rect::new(1920, 0, 1280, 1024));
        assert_eq!(entries[0].title, "Firefox - Start Page");
        assert_eq!(entries[1].desktop, None);
        assert_eq!(entries[1].title, "");
    }

    #[test]
    fn test_parse_net_wm_state() {
        let state = parse_net_wm_state(
            "_NET_WM_STATE(ATOM) = _NET_WM_STATE_MAXIMIZED_VERT, _NET_WM_STATE_MAXIMIZED_HORZ, _NET_WM_STATE_HIDDEN\n",
        );
        assert!(state.maximized_horz && state.maximized_vert && state.hidden);
        assert!(!state.skip_taskbar);

        assert_eq!(parse_net_wm_state("_NET_WM_STATE:  not found.\n"), NetWmState::default());
    }

    #[test]
    fn test_parse_display_geometry() {
        assert_eq!(parse_display_geometry("1920 1080\n"), Some((1920, 1080)));
        assert_eq!(parse_display_geometry("oops"), None);
    }

    #[test]
    fn test_classify_xprop_line() {
        assert_eq!(
            classify_xprop_line("_NET_CLIENT_LIST(WINDOW): window id # 0x1200007, 0x3a00003"),
            Some(HostNotification::WindowCreated)
        );
        assert_eq!(
            classify_xprop_line("_NET_DESKTOP_GEOMETRY(CARDINAL) = 1280, 720"),
            Some(HostNotification::MonitorsChanged)
        );
        assert_eq!(
            classify_xprop_line("_NET_CLIENT_LIST_STACKING(WINDOW): window id # 0x3a00003, 0x1200007"),
            Some(HostNotification::GrabOpEnd)
        );
        assert_eq!(
            classify_xprop_line("_NET_ACTIVE_WINDOW(WINDOW): window id # 0x3a00003"),
            Some(HostNotification::GrabOpEnd)
        );
        assert_eq!(classify_xprop_line("_NET_WORKAREA(CARDINAL) = 0, 0, 1920, 1048"), None);
    }

    #[test]
    fn test_parse_xrandr_monitors() {
        let output = "Monitors: 2\n \
                      0: +*HDMI-1 1920/531x1080/299+0+0  HDMI-1\n \
                      1: +DP-1 1280/340x1024/270+1920+0  DP-1\n";
        assert_eq!(
            parse_xrandr_monitors(output),
            vec![Rect::new(0, 0, 1920, 1080), Rect::new(1920, 0, 1280, 1024)]
        );
        assert!(parse_xrandr_monitors("Monitors: 0\n").is_empty());
    }

    #[test]
    fn test_monitor_of_uses_window_centre() {
        let monitors = [Rect::new(0, 0, 1920, 1080), Rect::new(1920, 0, 1280, 1024)];
        assert_eq!(monitor_of(&Rect::new(100, 100, 800, 600), &monitors), Some(0));
        // Большая часть окна на втором мониторе
        assert_eq!(monitor_of(&Rect::new(1800, 0, 800, 600), &monitors), Some(1));
        assert_eq!(monitor_of(&Rect::new(-900, 0, 800, 600), &monitors), None);
        assert_eq!(monitor_of(&Rect::new(0, 0, 800, 600), &[]), None);
    }

    fn client(x: i32, monitor: usize) -> ClientState {
        ClientState {
            rect: Rect::new(x, 0, 800, 600),
            hidden: false,
            fullscreen: false,
            monitor: Some(monitor),
        }
    }

    fn clients(entries: &[(u64, ClientState)]) -> ClientMap {
        entries.iter().map(|(id, state)| (WindowId(*id), *state)).collect()
    }

    #[test]
    fn test_diff_clients_unchanged_is_quiet() {
        let previous = clients(&[(1, client(0, 0)), (2, client(100, 0))]);
        assert!(diff_clients(&previous, &previous.clone()).is_empty());

        // Закрытое окно уведомления не порождает
        let current = clients(&[(1, client(0, 0))]);
        assert!(diff_clients(&previous, &current).is_empty());
    }

    #[test]
    fn test_diff_clients_new_window() {
        let previous = clients(&[(1, client(0, 0))]);
        let current = clients(&[(1, client(0, 0)), (2, client(100, 0))]);
        assert_eq!(diff_clients(&previous, &current), vec![HostNotification::WindowCreated]);
    }

    #[test]
    fn test_diff_clients_geometry_change() {
        let previous = clients(&[(1, client(0, 0))]);
        let current = clients(&[(1, client(40, 0))]);
        assert_eq!(diff_clients(&previous, &current), vec![HostNotification::SizeChanged]);
    }

    #[test]
    fn test_diff_clients_minimize_and_unminimize() {
        let previous = clients(&[(1, client(0, 0))]);
        let mut hidden = client(0, 0);
        hidden.hidden = true;
        let current = clients(&[(1, hidden)]);

        assert_eq!(diff_clients(&previous, &current), vec![HostNotification::Minimize]);
        assert_eq!(diff_clients(&current, &previous), vec![HostNotification::Unminimize]);
    }

    #[test]
    fn test_diff_clients_fullscreen_change() {
        let previous = clients(&[(1, client(0, 0))]);
        let mut fullscreen = client(0, 0);
        fullscreen.fullscreen = true;
        fullscreen.rect = Rect::new(0, 0, 1920, 1080);

        assert_eq!(
            diff_clients(&previous, &clients(&[(1, fullscreen)])),
            vec![HostNotification::InFullscreenChanged, HostNotification::SizeChanged]
        );
    }

    #[test]
    fn test_diff_clients_entered_monitor_replaces_size_change() {
        let previous = clients(&[(1, client(0, 0)), (2, client(100, 0))]);
        let current = clients(&[(1, client(1920, 1)), (2, client(300, 0))]);
        assert_eq!(
            diff_clients(&previous, &current),
            vec![HostNotification::WindowEnteredMonitor, HostNotification::SizeChanged]
        );
    }
}
